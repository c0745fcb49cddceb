//! Backed enumerations.

use std::fmt;

use super::{RichValue, RichValueExt, TransformContext, Typeable};
use crate::value::Value;

/// An enumeration whose variants are backed by a scalar storage value.
///
/// ```
/// use strata_orm::types::BackedEnum;
/// use strata_orm::Value;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// enum Status {
///     Open,
///     Closed,
/// }
///
/// impl BackedEnum for Status {
///     fn from_backing(value: &Value) -> Option<Self> {
///         match value.as_str()? {
///             "open" => Some(Self::Open),
///             "closed" => Some(Self::Closed),
///             _ => None,
///         }
///     }
///
///     fn backing(&self) -> Value {
///         match self {
///             Self::Open => "open".into(),
///             Self::Closed => "closed".into(),
///         }
///     }
/// }
/// ```
pub trait BackedEnum: fmt::Debug + Clone + PartialEq + Send + Sync + 'static {
    fn from_backing(value: &Value) -> Option<Self>;
    fn backing(&self) -> Value;
}

/// Rich value holding a backed enumeration variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enum<E>(pub E);

impl<E: BackedEnum> RichValue for Enum<E> {
    fn to_storage(&self, _ctx: &TransformContext<'_>) -> Option<Value> {
        Some(self.0.backing())
    }

    fn to_plain(&self, _ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        Some(self.0.backing().to_json())
    }
}

impl<E: BackedEnum> Typeable for Enum<E> {
    fn from_storage(raw: &Value, _ctx: &TransformContext<'_>) -> Option<Self> {
        if let Value::Rich(rich) = raw {
            return rich.as_any().downcast_ref::<Self>().cloned();
        }
        E::from_backing(raw).map(Self)
    }
}

impl<E: BackedEnum> Enum<E> {
    /// Wrap a variant as a field value.
    #[must_use]
    pub fn value(variant: E) -> Value {
        Value::rich(Self(variant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeFormats;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Level {
        Low,
        High,
    }

    impl BackedEnum for Level {
        fn from_backing(value: &Value) -> Option<Self> {
            match value.as_i64()? {
                1 => Some(Self::Low),
                2 => Some(Self::High),
                _ => None,
            }
        }

        fn backing(&self) -> Value {
            match self {
                Self::Low => Value::Int(1),
                Self::High => Value::Int(2),
            }
        }
    }

    #[test]
    fn enum_reduces_to_backing_scalar() {
        let formats = TimeFormats::default();
        let ctx = TransformContext::new("t", "level", &formats);
        let level = Enum::<Level>::from_storage(&Value::Int(2), &ctx).unwrap();
        assert_eq!(level.0, Level::High);
        assert_eq!(level.to_storage(&ctx), Some(Value::Int(2)));
        assert!(Enum::<Level>::from_storage(&Value::Int(9), &ctx).is_none());
        assert_eq!(Enum::<Level>::from_storage(&Value::Int(1), &ctx), Some(Enum(Level::Low)));
    }
}
