//! A configuration value paired with its "given" flag.

use serde::{Deserialize, Serialize};

/// How shell-level options flow into a task configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Every task field the task did not give takes the shell value.
    #[default]
    Global,
    /// Only shell fields that were explicitly given are copied, and only
    /// into task fields that were not.
    Local,
    /// Shell options are ignored.
    NoShell,
}

/// A value plus whether it was explicitly set.
///
/// `given == false` means the value is a default (or was inherited by a
/// merge); `given == true` means a user set it and merges must not touch it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Setting<T> {
    value: T,
    #[serde(default)]
    given: bool,
}

impl<T> Setting<T> {
    /// A default value, not given.
    pub const fn default_to(value: T) -> Self {
        Self {
            value,
            given: false,
        }
    }

    /// A value that was explicitly given.
    pub const fn given(value: T) -> Self {
        Self { value, given: true }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_given(&self) -> bool {
        self.given
    }

    /// Set the value and mark it given.
    pub fn set(&mut self, value: T) {
        self.value = value;
        self.given = true;
    }

    /// Restore a default, clearing the given flag.
    pub fn unset(&mut self, default: T) {
        self.value = default;
        self.given = false;
    }
}

impl<T: Copy> Setting<T> {
    pub fn get(&self) -> T {
        self.value
    }
}

impl<T: Clone> Setting<T> {
    /// Pull the shell value in under `policy`. Returns true when the value
    /// was replaced. The given flag is never changed by a merge.
    pub fn inherit(&mut self, shell: &Setting<T>, policy: MergePolicy) -> bool {
        if self.given {
            return false;
        }
        let take = match policy {
            MergePolicy::Global => true,
            MergePolicy::Local => shell.given,
            MergePolicy::NoShell => false,
        };
        if take {
            self.value = shell.value.clone();
        }
        take
    }
}

impl<T: Default> Default for Setting<T> {
    fn default() -> Self {
        Self::default_to(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_marks_given() {
        let mut s = Setting::default_to(1.0);
        assert!(!s.is_given());
        s.set(2.0);
        assert!(s.is_given());
        assert_eq!(s.get(), 2.0);
        s.unset(1.0);
        assert!(!s.is_given());
    }

    #[test]
    fn global_takes_shell_default_too() {
        let mut task = Setting::default_to(1.0);
        let shell = Setting::default_to(3.0);
        assert!(task.inherit(&shell, MergePolicy::Global));
        assert_eq!(task.get(), 3.0);
        assert!(!task.is_given());
    }

    #[test]
    fn local_needs_shell_given() {
        let mut task = Setting::default_to(1.0);
        assert!(!task.inherit(&Setting::default_to(3.0), MergePolicy::Local));
        assert_eq!(task.get(), 1.0);
        assert!(task.inherit(&Setting::given(4.0), MergePolicy::Local));
        assert_eq!(task.get(), 4.0);
    }

    #[test]
    fn given_task_field_is_never_overridden() {
        let mut task = Setting::given(1.0);
        for policy in [MergePolicy::Global, MergePolicy::Local, MergePolicy::NoShell] {
            assert!(!task.inherit(&Setting::given(9.0), policy));
            assert_eq!(task.get(), 1.0);
        }
    }

    #[test]
    fn noshell_ignores_shell() {
        let mut task = Setting::default_to(1.0);
        assert!(!task.inherit(&Setting::given(9.0), MergePolicy::NoShell));
        assert_eq!(task.get(), 1.0);
    }
}
