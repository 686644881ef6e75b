//! Named parameter table over [`TaskConfig`].
//!
//! The analysis layer sets options by name (`"reltol"`, `"maxord"`, ...).
//! Each name maps to one field, one value kind and one validity range.

use crate::error::{ConfigError, ConfigResult};
use crate::method::IntegrationMethod;
use crate::task::{MAX_LOAD_THREADS, MAX_LOOP_THREADS, TaskConfig};
use std::fmt;
use std::ops::{Bound, RangeBounds};
use std::str::FromStr;

/// Kind of value a parameter holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Real,
    Int,
    Bool,
    Method,
}

/// A value supplied to or read from the parameter table.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    Real(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Real(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParamId {
    AbsTol,
    RelTol,
    VnTol,
    ChgTol,
    TrTol,
    PivRel,
    PivTol,
    Gmin,
    Xmu,
    TrapRatio,
    MinBreak,
    DcMaxIter,
    TranMaxIter,
    MaxOrder,
    Method,
    LoadThreads,
    LoopThreads,
    TrapCheck,
    Temp,
    NomTemp,
}

type Range = (Bound<f64>, Bound<f64>);

const fn closed(lo: f64, hi: f64) -> Range {
    (Bound::Included(lo), Bound::Included(hi))
}

const fn open_low(lo: f64, hi: f64) -> Range {
    (Bound::Excluded(lo), Bound::Included(hi))
}

impl ParamId {
    pub const ALL: [ParamId; 20] = [
        ParamId::AbsTol,
        ParamId::RelTol,
        ParamId::VnTol,
        ParamId::ChgTol,
        ParamId::TrTol,
        ParamId::PivRel,
        ParamId::PivTol,
        ParamId::Gmin,
        ParamId::Xmu,
        ParamId::TrapRatio,
        ParamId::MinBreak,
        ParamId::DcMaxIter,
        ParamId::TranMaxIter,
        ParamId::MaxOrder,
        ParamId::Method,
        ParamId::LoadThreads,
        ParamId::LoopThreads,
        ParamId::TrapCheck,
        ParamId::Temp,
        ParamId::NomTemp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ParamId::AbsTol => "abstol",
            ParamId::RelTol => "reltol",
            ParamId::VnTol => "vntol",
            ParamId::ChgTol => "chgtol",
            ParamId::TrTol => "trtol",
            ParamId::PivRel => "pivrel",
            ParamId::PivTol => "pivtol",
            ParamId::Gmin => "gmin",
            ParamId::Xmu => "xmu",
            ParamId::TrapRatio => "trapratio",
            ParamId::MinBreak => "minbreak",
            ParamId::DcMaxIter => "dcmaxiter",
            ParamId::TranMaxIter => "tranmaxiter",
            ParamId::MaxOrder => "maxord",
            ParamId::Method => "method",
            ParamId::LoadThreads => "loadthrds",
            ParamId::LoopThreads => "loopthrds",
            ParamId::TrapCheck => "trapcheck",
            ParamId::Temp => "temp",
            ParamId::NomTemp => "nomtemp",
        }
    }

    pub fn kind(self) -> ParamKind {
        match self {
            ParamId::DcMaxIter
            | ParamId::TranMaxIter
            | ParamId::MaxOrder
            | ParamId::LoadThreads
            | ParamId::LoopThreads => ParamKind::Int,
            ParamId::Method => ParamKind::Method,
            ParamId::TrapCheck => ParamKind::Bool,
            _ => ParamKind::Real,
        }
    }

    /// Validity range for numeric parameters.
    pub fn range(self) -> Option<Range> {
        let r = match self {
            ParamId::AbsTol => open_low(0.0, 1.0),
            ParamId::RelTol => open_low(0.0, 1.0),
            ParamId::VnTol => open_low(0.0, 1.0),
            ParamId::ChgTol => open_low(0.0, 1.0),
            ParamId::TrTol => closed(1.0, 100.0),
            ParamId::PivRel => open_low(0.0, 1.0),
            ParamId::PivTol => open_low(0.0, 1.0),
            ParamId::Gmin => closed(0.0, 1e-3),
            ParamId::Xmu => closed(0.0, 0.5),
            ParamId::TrapRatio => open_low(1.0, 1e3),
            ParamId::MinBreak => (Bound::Included(0.0), Bound::Unbounded),
            ParamId::DcMaxIter => closed(1.0, 10_000.0),
            ParamId::TranMaxIter => closed(1.0, 1_000.0),
            ParamId::MaxOrder => closed(1.0, 6.0),
            ParamId::LoadThreads => closed(0.0, MAX_LOAD_THREADS as f64),
            ParamId::LoopThreads => closed(0.0, MAX_LOOP_THREADS as f64),
            ParamId::Temp | ParamId::NomTemp => closed(-273.15, 1_000.0),
            ParamId::Method | ParamId::TrapCheck => return None,
        };
        Some(r)
    }

    pub(crate) fn check_range(self, value: f64) -> ConfigResult<()> {
        match self.range() {
            Some(range) if !range.contains(&value) => Err(ConfigError::OutOfRange {
                name: self.name(),
                value,
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ParamId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let alias = match key.as_str() {
            "itl1" => Some(ParamId::DcMaxIter),
            "itl4" => Some(ParamId::TranMaxIter),
            "maxorder" => Some(ParamId::MaxOrder),
            "tnom" => Some(ParamId::NomTemp),
            _ => None,
        };
        alias
            .or_else(|| ParamId::ALL.into_iter().find(|id| id.name() == key))
            .ok_or(ConfigError::UnknownParam {
                name: s.to_string(),
            })
    }
}

fn as_real(id: ParamId, value: &ParamValue) -> ConfigResult<f64> {
    match value {
        ParamValue::Real(v) => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        _ => Err(ConfigError::WrongKind {
            name: id.name(),
            expected: "number",
        }),
    }
}

fn as_count(id: ParamId, value: &ParamValue) -> ConfigResult<usize> {
    let v = match value {
        ParamValue::Int(v) => *v as f64,
        ParamValue::Real(v) if v.fract() == 0.0 => *v,
        _ => {
            return Err(ConfigError::WrongKind {
                name: id.name(),
                expected: "integer",
            });
        }
    };
    id.check_range(v)?;
    Ok(v as usize)
}

impl TaskConfig {
    /// Set a parameter by name, validating kind and range.
    pub fn set_param_by_name(&mut self, name: &str, value: ParamValue) -> ConfigResult<()> {
        let id: ParamId = name.parse()?;
        self.set_param(id, value)
    }

    /// Set a parameter, validating kind and range, and mark it given.
    pub fn set_param(&mut self, id: ParamId, value: ParamValue) -> ConfigResult<()> {
        match id.kind() {
            ParamKind::Real => {
                let v = as_real(id, &value)?;
                id.check_range(v)?;
                self.real_field_mut(id).set(v);
            }
            ParamKind::Int => {
                let v = as_count(id, &value)?;
                match id {
                    ParamId::DcMaxIter => self.dc_max_iter.set(v),
                    ParamId::TranMaxIter => self.tran_max_iter.set(v),
                    ParamId::MaxOrder => self.max_order.set(v),
                    ParamId::LoadThreads => self.load_threads.set(v),
                    _ => self.loop_threads.set(v),
                }
            }
            ParamKind::Bool => match value {
                ParamValue::Bool(b) => self.trap_check.set(b),
                ParamValue::Int(i) => self.trap_check.set(i != 0),
                _ => {
                    return Err(ConfigError::WrongKind {
                        name: id.name(),
                        expected: "boolean",
                    });
                }
            },
            ParamKind::Method => match value {
                ParamValue::Text(name) => self.method.set(name.parse::<IntegrationMethod>()?),
                _ => {
                    return Err(ConfigError::WrongKind {
                        name: id.name(),
                        expected: "method name",
                    });
                }
            },
        }
        tracing::debug!(param = id.name(), "task parameter set");
        Ok(())
    }

    /// Read a parameter back.
    pub fn param(&self, id: ParamId) -> ParamValue {
        match id.kind() {
            ParamKind::Real | ParamKind::Int => match self.numeric_value(id) {
                Some(v) if id.kind() == ParamKind::Int => ParamValue::Int(v as i64),
                Some(v) => ParamValue::Real(v),
                None => ParamValue::Real(f64::NAN),
            },
            ParamKind::Bool => ParamValue::Bool(self.trap_check.get()),
            ParamKind::Method => ParamValue::Text(self.method.get().name().to_string()),
        }
    }

    pub fn is_param_given(&self, id: ParamId) -> bool {
        match id {
            ParamId::DcMaxIter => self.dc_max_iter.is_given(),
            ParamId::TranMaxIter => self.tran_max_iter.is_given(),
            ParamId::MaxOrder => self.max_order.is_given(),
            ParamId::LoadThreads => self.load_threads.is_given(),
            ParamId::LoopThreads => self.loop_threads.is_given(),
            ParamId::Method => self.method.is_given(),
            ParamId::TrapCheck => self.trap_check.is_given(),
            _ => self.real_field(id).is_given(),
        }
    }

    /// Restore a parameter to its default and clear its given flag.
    pub fn unset_param(&mut self, id: ParamId) {
        let defaults = TaskConfig::default();
        match id {
            ParamId::DcMaxIter => self.dc_max_iter = defaults.dc_max_iter,
            ParamId::TranMaxIter => self.tran_max_iter = defaults.tran_max_iter,
            ParamId::MaxOrder => self.max_order = defaults.max_order,
            ParamId::LoadThreads => self.load_threads = defaults.load_threads,
            ParamId::LoopThreads => self.loop_threads = defaults.loop_threads,
            ParamId::Method => self.method = defaults.method,
            ParamId::TrapCheck => self.trap_check = defaults.trap_check,
            _ => *self.real_field_mut(id) = *defaults.real_field(id),
        }
    }

    pub(crate) fn numeric_value(&self, id: ParamId) -> Option<f64> {
        match id {
            ParamId::DcMaxIter => Some(self.dc_max_iter.get() as f64),
            ParamId::TranMaxIter => Some(self.tran_max_iter.get() as f64),
            ParamId::MaxOrder => Some(self.max_order.get() as f64),
            ParamId::LoadThreads => Some(self.load_threads.get() as f64),
            ParamId::LoopThreads => Some(self.loop_threads.get() as f64),
            ParamId::Method | ParamId::TrapCheck => None,
            _ => Some(self.real_field(id).get()),
        }
    }

    fn real_field(&self, id: ParamId) -> &crate::Setting<f64> {
        match id {
            ParamId::AbsTol => &self.abs_tol,
            ParamId::RelTol => &self.rel_tol,
            ParamId::VnTol => &self.vn_tol,
            ParamId::ChgTol => &self.chg_tol,
            ParamId::TrTol => &self.tr_tol,
            ParamId::PivRel => &self.pivot_rel_tol,
            ParamId::PivTol => &self.pivot_abs_tol,
            ParamId::Gmin => &self.gmin,
            ParamId::Xmu => &self.xmu,
            ParamId::TrapRatio => &self.trap_ratio,
            ParamId::MinBreak => &self.min_break,
            ParamId::Temp => &self.temperature,
            _ => &self.nominal_temperature,
        }
    }

    fn real_field_mut(&mut self, id: ParamId) -> &mut crate::Setting<f64> {
        match id {
            ParamId::AbsTol => &mut self.abs_tol,
            ParamId::RelTol => &mut self.rel_tol,
            ParamId::VnTol => &mut self.vn_tol,
            ParamId::ChgTol => &mut self.chg_tol,
            ParamId::TrTol => &mut self.tr_tol,
            ParamId::PivRel => &mut self.pivot_rel_tol,
            ParamId::PivTol => &mut self.pivot_abs_tol,
            ParamId::Gmin => &mut self.gmin,
            ParamId::Xmu => &mut self.xmu,
            ParamId::TrapRatio => &mut self.trap_ratio,
            ParamId::MinBreak => &mut self.min_break,
            ParamId::Temp => &mut self.temperature,
            _ => &mut self.nominal_temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for id in ParamId::ALL {
            assert_eq!(id.name().parse::<ParamId>().unwrap(), id);
        }
        assert_eq!("ITL4".parse::<ParamId>().unwrap(), ParamId::TranMaxIter);
        assert!("bogus".parse::<ParamId>().is_err());
    }

    #[test]
    fn set_by_name_marks_given() {
        let mut cfg = TaskConfig::default();
        cfg.set_param_by_name("reltol", ParamValue::Real(1e-4)).unwrap();
        assert!(cfg.is_param_given(ParamId::RelTol));
        assert_eq!(cfg.param(ParamId::RelTol), ParamValue::Real(1e-4));

        cfg.set_param_by_name("maxord", ParamValue::Int(4)).unwrap();
        assert_eq!(cfg.max_order.get(), 4);

        cfg.set_param_by_name("method", ParamValue::Text("gear".into()))
            .unwrap();
        assert_eq!(cfg.method.get(), IntegrationMethod::Gear);
        assert_eq!(cfg.param(ParamId::Method), ParamValue::Text("gear".into()));
    }

    #[test]
    fn trapratio_must_exceed_one() {
        let mut cfg = TaskConfig::default();
        let err = cfg
            .set_param(ParamId::TrapRatio, ParamValue::Real(1.0))
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "trapratio", .. }));
        cfg.set_param(ParamId::TrapRatio, ParamValue::Real(1.5)).unwrap();
        assert_eq!(cfg.trap_ratio.get(), 1.5);
    }

    #[test]
    fn thread_counts_are_bounded() {
        let mut cfg = TaskConfig::default();
        assert!(cfg.set_param(ParamId::LoadThreads, ParamValue::Int(31)).is_ok());
        assert!(cfg.set_param(ParamId::LoadThreads, ParamValue::Int(32)).is_err());
        assert!(cfg.set_param(ParamId::LoopThreads, ParamValue::Int(-1)).is_err());
        assert_eq!(cfg.load_threads.get(), 31);
    }

    #[test]
    fn wrong_kinds_are_rejected() {
        let mut cfg = TaskConfig::default();
        assert!(matches!(
            cfg.set_param(ParamId::Xmu, ParamValue::Bool(true)),
            Err(ConfigError::WrongKind { .. })
        ));
        assert!(matches!(
            cfg.set_param(ParamId::MaxOrder, ParamValue::Real(2.5)),
            Err(ConfigError::WrongKind { .. })
        ));
        assert!(matches!(
            cfg.set_param(ParamId::Method, ParamValue::Text("rk4".into())),
            Err(ConfigError::Method { .. })
        ));
        assert!(!cfg.is_param_given(ParamId::Method));
    }

    #[test]
    fn unset_restores_default() {
        let mut cfg = TaskConfig::default();
        cfg.set_param(ParamId::Gmin, ParamValue::Real(1e-9)).unwrap();
        cfg.set_param(ParamId::TrapCheck, ParamValue::Bool(true)).unwrap();
        cfg.unset_param(ParamId::Gmin);
        cfg.unset_param(ParamId::TrapCheck);
        assert_eq!(cfg, TaskConfig::default());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn accepted_values_always_validate(idx in 0usize..20, raw in -2000.0_f64..2000.0) {
            let id = ParamId::ALL[idx];
            let mut cfg = TaskConfig::default();
            let value = match id.kind() {
                ParamKind::Int => ParamValue::Int(raw as i64),
                ParamKind::Bool => ParamValue::Bool(raw > 0.0),
                ParamKind::Method => ParamValue::Text(if raw > 0.0 { "gear" } else { "trap" }.into()),
                ParamKind::Real => ParamValue::Real(raw),
            };
            if cfg.set_param(id, value).is_ok() {
                prop_assert!(cfg.is_param_given(id));
                prop_assert!(cfg.validate().is_ok());
            } else {
                prop_assert!(!cfg.is_param_given(id));
            }
        }
    }
}
