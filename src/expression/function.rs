//! Builtin function library.
//!
//! Every builtin is one variant of [`Builtin`], declared once in the table
//! below together with its SQL name and arity bounds. Evaluated arguments are
//! passed to [`apply`]; the conditional functions (IFMISSING and friends)
//! are instead evaluated lazily by the evaluator through [`evaluate_lazy`].

use crate::context::Context;
use crate::expression::expr::VARIADIC;
use crate::expression::ExpressionResult;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Return NULL from the enclosing function unless `$value` is an array
macro_rules! array_arg {
    ($value:expr) => {
        match $value.as_array() {
            Some(array) => array,
            None => return Ok(Value::Null),
        }
    };
}

macro_rules! string_arg {
    ($value:expr) => {
        match $value.as_str() {
            Some(s) => s,
            None => return Ok(Value::Null),
        }
    };
}

macro_rules! object_arg {
    ($value:expr) => {
        match $value.as_object() {
            Some(object) => object,
            None => return Ok(Value::Null),
        }
    };
}

macro_rules! number_arg {
    ($value:expr) => {
        match $value.as_f64() {
            Some(n) => n,
            None => return Ok(Value::Null),
        }
    };
}

/// Integral number, or NULL from the enclosing function
macro_rules! integer_arg {
    ($value:expr) => {
        match $value.as_i64() {
            Some(i) => i,
            None => return Ok(Value::Null),
        }
    };
}

mod array;
mod bit;
mod cond;
mod math;
mod misc;
mod object;
mod string;
mod types;

pub(crate) use cond::evaluate_lazy;

macro_rules! builtins {
    ($($variant:ident => $name:literal, $min:expr, $max:expr;)*) => {
        /// Builtin functions
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Builtin {
            $(
                #[serde(rename = $name)]
                $variant,
            )*
        }

        impl Builtin {
            pub fn name(&self) -> &'static str {
                match self {
                    $(Builtin::$variant => $name,)*
                }
            }

            /// (min, max) argument counts
            pub fn arity(&self) -> (usize, usize) {
                match self {
                    $(Builtin::$variant => ($min, $max),)*
                }
            }

            /// Case-insensitive lookup by SQL name
            pub fn from_name(name: &str) -> Option<Self> {
                match name.to_ascii_uppercase().as_str() {
                    $($name => Some(Builtin::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

builtins! {
    ArrayAppend => "ARRAY_APPEND", 2, VARIADIC;
    ArrayAvg => "ARRAY_AVG", 1, 1;
    ArrayConcat => "ARRAY_CONCAT", 2, VARIADIC;
    ArrayContains => "ARRAY_CONTAINS", 2, 2;
    ArrayCount => "ARRAY_COUNT", 1, 1;
    ArrayDistinct => "ARRAY_DISTINCT", 1, 1;
    ArrayFlatten => "ARRAY_FLATTEN", 2, 2;
    ArrayIfNull => "ARRAY_IFNULL", 1, 1;
    ArrayInsert => "ARRAY_INSERT", 3, VARIADIC;
    ArrayIntersect => "ARRAY_INTERSECT", 2, VARIADIC;
    ArrayLength => "ARRAY_LENGTH", 1, 1;
    ArrayMax => "ARRAY_MAX", 1, 1;
    ArrayMin => "ARRAY_MIN", 1, 1;
    ArrayMove => "ARRAY_MOVE", 3, 3;
    ArrayPosition => "ARRAY_POSITION", 2, 2;
    ArrayPrepend => "ARRAY_PREPEND", 2, VARIADIC;
    ArrayPut => "ARRAY_PUT", 2, VARIADIC;
    ArrayRange => "ARRAY_RANGE", 2, 3;
    ArrayRemove => "ARRAY_REMOVE", 2, VARIADIC;
    ArrayRepeat => "ARRAY_REPEAT", 2, 2;
    ArrayReplace => "ARRAY_REPLACE", 3, 4;
    ArrayReverse => "ARRAY_REVERSE", 1, 1;
    ArraySort => "ARRAY_SORT", 1, 1;
    ArraySum => "ARRAY_SUM", 1, 1;
    ArraySwap => "ARRAY_SWAP", 3, 3;
    ArrayUnion => "ARRAY_UNION", 2, VARIADIC;

    BitAnd => "BITAND", 2, VARIADIC;
    BitOr => "BITOR", 2, VARIADIC;
    BitXor => "BITXOR", 2, VARIADIC;
    BitNot => "BITNOT", 1, 1;
    BitShift => "BITSHIFT", 2, 3;
    BitSet => "BITSET", 2, 2;
    BitClear => "BITCLEAR", 2, 2;
    BitTest => "BITTEST", 2, 3;

    Abs => "ABS", 1, 1;
    Ceil => "CEIL", 1, 1;
    Floor => "FLOOR", 1, 1;
    Round => "ROUND", 1, 2;
    Trunc => "TRUNC", 1, 2;
    Sqrt => "SQRT", 1, 1;
    Power => "POWER", 2, 2;
    Exp => "EXP", 1, 1;
    Ln => "LN", 1, 1;
    Log => "LOG", 1, 1;
    Sign => "SIGN", 1, 1;
    Pi => "PI", 0, 0;
    Random => "RANDOM", 0, 1;

    Lower => "LOWER", 1, 1;
    Upper => "UPPER", 1, 1;
    Length => "LENGTH", 1, 1;
    Concat => "CONCAT", 2, VARIADIC;
    Contains => "CONTAINS", 2, 2;
    Substr => "SUBSTR", 2, 3;
    Trim => "TRIM", 1, 2;
    LTrim => "LTRIM", 1, 2;
    RTrim => "RTRIM", 1, 2;
    Replace => "REPLACE", 3, 4;
    Split => "SPLIT", 1, 2;
    Position => "POSITION", 2, 2;
    Repeat => "REPEAT", 2, 2;
    Reverse => "REVERSE", 1, 1;

    ObjectLength => "OBJECT_LENGTH", 1, 1;
    ObjectNames => "OBJECT_NAMES", 1, 1;
    ObjectValues => "OBJECT_VALUES", 1, 1;
    ObjectPairs => "OBJECT_PAIRS", 1, 1;
    ObjectAdd => "OBJECT_ADD", 3, 3;
    ObjectPut => "OBJECT_PUT", 3, 3;
    ObjectRemove => "OBJECT_REMOVE", 2, VARIADIC;
    ObjectConcat => "OBJECT_CONCAT", 2, VARIADIC;

    Type => "TYPE", 1, 1;
    IsArray => "IS_ARRAY", 1, 1;
    IsAtom => "IS_ATOM", 1, 1;
    IsBoolean => "IS_BOOLEAN", 1, 1;
    IsNumber => "IS_NUMBER", 1, 1;
    IsObject => "IS_OBJECT", 1, 1;
    IsString => "IS_STRING", 1, 1;
    IsBinary => "IS_BINARY", 1, 1;
    ToArray => "TO_ARRAY", 1, 1;
    ToBoolean => "TO_BOOLEAN", 1, 1;
    ToNumber => "TO_NUMBER", 1, 1;
    ToString => "TO_STRING", 1, 1;

    IfMissing => "IFMISSING", 2, VARIADIC;
    IfNull => "IFNULL", 2, VARIADIC;
    IfMissingOrNull => "IFMISSINGORNULL", 2, VARIADIC;
    MissingIf => "MISSINGIF", 2, 2;
    NullIf => "NULLIF", 2, 2;

    Greatest => "GREATEST", 2, VARIADIC;
    Least => "LEAST", 2, VARIADIC;
    EncodeJson => "ENCODE_JSON", 1, 1;
    DecodeJson => "DECODE_JSON", 1, 1;
    InferValue => "INFER_VALUE", 1, 2;
    Abort => "ABORT", 0, 1;
}

impl Builtin {
    /// Never folded or cached
    pub fn is_volatile(&self) -> bool {
        matches!(self, Builtin::Random | Builtin::Abort | Builtin::InferValue)
    }

    /// Operands are evaluated lazily, left to right
    pub fn is_conditional(&self) -> bool {
        matches!(
            self,
            Builtin::IfMissing | Builtin::IfNull | Builtin::IfMissingOrNull
        )
    }

    /// Boolean-valued predicate functions
    pub fn returns_boolean(&self) -> bool {
        matches!(
            self,
            Builtin::ArrayContains
                | Builtin::Contains
                | Builtin::BitTest
                | Builtin::IsArray
                | Builtin::IsAtom
                | Builtin::IsBoolean
                | Builtin::IsNumber
                | Builtin::IsObject
                | Builtin::IsString
                | Builtin::IsBinary
                | Builtin::ToBoolean
        )
    }

    /// A MISSING argument makes the result MISSING
    fn propagates_missing(&self) -> bool {
        !matches!(
            self,
            Builtin::Type
                | Builtin::IfMissing
                | Builtin::IfNull
                | Builtin::IfMissingOrNull
                | Builtin::Greatest
                | Builtin::Least
                | Builtin::ObjectAdd
                | Builtin::ObjectPut
        )
    }

    /// A NULL argument makes the result NULL
    fn propagates_null(&self) -> bool {
        self.propagates_missing()
            && !matches!(
                self,
                Builtin::ArrayAppend
                    | Builtin::ArrayPrepend
                    | Builtin::ArrayPut
                    | Builtin::ArrayInsert
                    | Builtin::ArrayRemove
                    | Builtin::ArrayPosition
                    | Builtin::ArrayContains
                    | Builtin::EncodeJson
                    | Builtin::InferValue
                    | Builtin::Abort
            )
    }
}

/// MISSING if any argument is MISSING, otherwise NULL if any is NULL
pub(crate) fn propagate(args: &[Value]) -> Option<Value> {
    if args.iter().any(Value::is_missing) {
        Some(Value::Missing)
    } else if args.iter().any(Value::is_null) {
        Some(Value::Null)
    } else {
        None
    }
}

/// Apply a builtin to evaluated arguments. The argument count must already
/// be within the builtin's arity.
pub fn apply(builtin: Builtin, args: &[Value], ctx: &dyn Context) -> ExpressionResult<Value> {
    if builtin.propagates_missing() && args.iter().any(Value::is_missing) {
        return Ok(Value::Missing);
    }
    if builtin.propagates_null() && args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    let config = ctx.config();
    match builtin {
        Builtin::ArrayAppend => array::append(args),
        Builtin::ArrayAvg => array::avg(args),
        Builtin::ArrayConcat => array::concat(args),
        Builtin::ArrayContains => array::contains(args),
        Builtin::ArrayCount => array::count(args),
        Builtin::ArrayDistinct => array::distinct(args, ctx.pools()),
        Builtin::ArrayFlatten => array::flatten(args),
        Builtin::ArrayIfNull => array::if_null(args),
        Builtin::ArrayInsert => array::insert(args),
        Builtin::ArrayIntersect => array::intersect(args, ctx.pools()),
        Builtin::ArrayLength => array::length(args),
        Builtin::ArrayMax => array::max(args),
        Builtin::ArrayMin => array::min(args),
        Builtin::ArrayMove => array::move_element(args),
        Builtin::ArrayPosition => array::position(args),
        Builtin::ArrayPrepend => array::prepend(args),
        Builtin::ArrayPut => array::put(args),
        Builtin::ArrayRange => array::range(args, config),
        Builtin::ArrayRemove => array::remove(args),
        Builtin::ArrayRepeat => array::repeat(args, config),
        Builtin::ArrayReplace => array::replace(args),
        Builtin::ArrayReverse => array::reverse(args),
        Builtin::ArraySort => array::sort(args),
        Builtin::ArraySum => array::sum(args),
        Builtin::ArraySwap => array::swap(args),
        Builtin::ArrayUnion => array::union(args, ctx.pools()),

        Builtin::BitAnd => bit::and(args),
        Builtin::BitOr => bit::or(args),
        Builtin::BitXor => bit::xor(args),
        Builtin::BitNot => bit::not(args),
        Builtin::BitShift => bit::shift(args),
        Builtin::BitSet => bit::set(args),
        Builtin::BitClear => bit::clear(args),
        Builtin::BitTest => bit::bit_test(args),

        Builtin::Abs => math::abs(args),
        Builtin::Ceil => math::ceil(args),
        Builtin::Floor => math::floor(args),
        Builtin::Round => math::round(args),
        Builtin::Trunc => math::trunc(args),
        Builtin::Sqrt => math::sqrt(args),
        Builtin::Power => math::power(args),
        Builtin::Exp => math::exp(args),
        Builtin::Ln => math::ln(args),
        Builtin::Log => math::log(args),
        Builtin::Sign => math::sign(args),
        Builtin::Pi => math::pi(),
        Builtin::Random => math::random(args),

        Builtin::Lower => string::lower(args),
        Builtin::Upper => string::upper(args),
        Builtin::Length => string::length(args),
        Builtin::Concat => string::concat(args, config),
        Builtin::Contains => string::contains(args),
        Builtin::Substr => string::substr(args),
        Builtin::Trim => string::trim(args, string::TrimSide::Both),
        Builtin::LTrim => string::trim(args, string::TrimSide::Left),
        Builtin::RTrim => string::trim(args, string::TrimSide::Right),
        Builtin::Replace => string::replace(args),
        Builtin::Split => string::split(args),
        Builtin::Position => string::position(args),
        Builtin::Repeat => string::repeat(args, config),
        Builtin::Reverse => string::reverse(args),

        Builtin::ObjectLength => object::length(args),
        Builtin::ObjectNames => object::names(args),
        Builtin::ObjectValues => object::values(args),
        Builtin::ObjectPairs => object::pairs(args),
        Builtin::ObjectAdd => object::add(args),
        Builtin::ObjectPut => object::put(args),
        Builtin::ObjectRemove => object::remove(args),
        Builtin::ObjectConcat => object::concat(args),

        Builtin::Type => types::type_name(args),
        Builtin::IsArray => types::is_array(args),
        Builtin::IsAtom => types::is_atom(args),
        Builtin::IsBoolean => types::is_boolean(args),
        Builtin::IsNumber => types::is_number(args),
        Builtin::IsObject => types::is_object(args),
        Builtin::IsString => types::is_string(args),
        Builtin::IsBinary => types::is_binary(args),
        Builtin::ToArray => types::to_array(args),
        Builtin::ToBoolean => types::to_boolean(args),
        Builtin::ToNumber => types::to_number(args),
        Builtin::ToString => types::to_string(args),

        Builtin::IfMissing | Builtin::IfNull | Builtin::IfMissingOrNull => {
            Ok(cond::first_accepted(builtin, args))
        }
        Builtin::MissingIf => cond::missing_if(args),
        Builtin::NullIf => cond::null_if(args),

        Builtin::Greatest => misc::greatest(args),
        Builtin::Least => misc::least(args),
        Builtin::EncodeJson => misc::encode_json(args),
        Builtin::DecodeJson => misc::decode_json(args),
        Builtin::InferValue => misc::infer_value(args, ctx),
        Builtin::Abort => misc::abort(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MemoryContext;

    #[test]
    fn test_name_table() {
        assert_eq!(Builtin::from_name("array_length"), Some(Builtin::ArrayLength));
        assert_eq!(Builtin::ArrayLength.name(), "ARRAY_LENGTH");
        assert_eq!(Builtin::ArrayRange.arity(), (2, 3));
        assert_eq!(Builtin::from_name("nope"), None);
    }

    #[test]
    fn test_flags() {
        assert!(Builtin::Random.is_volatile());
        assert!(!Builtin::Abs.is_volatile());
        assert!(Builtin::IfNull.is_conditional());
        assert!(Builtin::IsArray.returns_boolean());
    }

    #[test]
    fn test_generic_propagation() -> ExpressionResult<()> {
        let ctx = MemoryContext::default();
        let args = [Value::Null, Value::Missing];
        assert_eq!(apply(Builtin::Concat, &args, &ctx)?, Value::Missing);
        assert!(apply(Builtin::Lower, &[Value::Null], &ctx)?.is_null());
        assert_eq!(
            apply(Builtin::Type, &[Value::Missing], &ctx)?,
            Value::string("missing")
        );
        assert_eq!(propagate(&[Value::Int(1), Value::Null]), Some(Value::Null));
        assert_eq!(propagate(&[Value::Int(1)]), None);
        Ok(())
    }
}
