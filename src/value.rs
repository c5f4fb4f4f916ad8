use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer};

/// A Scratch scalar. Numbers keep their integer representation as long as
/// possible; the special variants exist because Scratch treats Infinity,
/// -Infinity and NaN as first-class values with their own coercion rules.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Infinity,
    NegativeInfinity,
    NaN,
}

impl Default for Value {
    fn default() -> Self {
        Value::Integer(0)
    }
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Double(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Value::Infinity)
    }

    pub fn is_negative_infinity(&self) -> bool {
        matches!(self, Value::NegativeInfinity)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::NaN)
    }

    fn is_special(&self) -> bool {
        matches!(self, Value::Infinity | Value::NegativeInfinity | Value::NaN)
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Integer(integer) => *integer as f64,
            Value::Double(double) => *double,
            Value::Bool(boolean) => *boolean as i64 as f64,
            Value::String(string) => string_to_double(string),
            Value::Infinity => f64::INFINITY,
            Value::NegativeInfinity => f64::NEG_INFINITY,
            Value::NaN => 0.0,
        }
    }

    pub fn to_i64(&self) -> i64 {
        match self {
            Value::Integer(integer) => *integer,
            Value::Double(double) => *double as i64,
            Value::Bool(boolean) => *boolean as i64,
            Value::String(string) => string_to_double(string) as i64,
            Value::Infinity | Value::NegativeInfinity | Value::NaN => 0,
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Integer(integer) => *integer == 1,
            Value::Double(double) => *double == 1.0,
            Value::Bool(boolean) => *boolean,
            Value::String(string) => strings_equal(string, "true") || string == "1",
            Value::Infinity | Value::NegativeInfinity | Value::NaN => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(integer) => write!(f, "{integer}"),
            // Rust's shortest round-trip formatting already has no trailing
            // zeros and no trailing point.
            Value::Double(double) => write!(f, "{double}"),
            Value::Bool(boolean) => write!(f, "{}", if *boolean { "true" } else { "false" }),
            Value::String(string) => f.write_str(string),
            Value::Infinity => f.write_str("Infinity"),
            Value::NegativeInfinity => f.write_str("-Infinity"),
            Value::NaN => f.write_str("NaN"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Value::NaN
        } else if v == f64::INFINITY {
            Value::Infinity
        } else if v == f64::NEG_INFINITY {
            Value::NegativeInfinity
        } else {
            Value::Double(v)
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Scratch equality: number-vs-anything coerces both sides to double,
/// bool-vs-anything coerces to bool, strings compare case-insensitively.
/// A NaN-typed value is never equal to anything, not even another NaN.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.is_special() || other.is_special() {
            if self.is_nan() || other.is_nan() {
                return false;
            }
            if self.is_special() && other.is_special() {
                return (self.is_infinity() && other.is_infinity())
                    || (self.is_negative_infinity() && other.is_negative_infinity());
            }
        }
        if self.is_number() || other.is_number() {
            self.to_f64() == other.to_f64()
        } else if self.is_bool() || other.is_bool() {
            self.to_bool() == other.to_bool()
        } else if self.is_string() || other.is_string() {
            match (self, other) {
                (Value::String(a), Value::String(b)) => strings_equal(a, b),
                _ => strings_equal(&self.to_string(), &other.to_string()),
            }
        } else {
            false
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if greater(self, other) {
            Some(Ordering::Greater)
        } else if less(self, other) {
            Some(Ordering::Less)
        } else {
            // NaN-typed operands compare neither less nor greater
            None
        }
    }
}

fn greater(v1: &Value, v2: &Value) -> bool {
    if v1.is_special() || v2.is_special() {
        if v1.is_infinity() {
            return !v2.is_infinity();
        } else if v1.is_negative_infinity() {
            return false;
        } else if v2.is_infinity() {
            return false;
        } else if v2.is_negative_infinity() {
            return true;
        }
    }
    if let (Value::Integer(a), Value::Integer(b)) = (v1, v2) {
        a > b
    } else {
        v1.to_f64() > v2.to_f64()
    }
}

fn less(v1: &Value, v2: &Value) -> bool {
    if v1.is_special() || v2.is_special() {
        if v1.is_infinity() {
            return false;
        } else if v1.is_negative_infinity() {
            return !v2.is_negative_infinity();
        } else if v2.is_infinity() {
            return !v1.is_infinity();
        } else if v2.is_negative_infinity() {
            return false;
        }
    }
    if let (Value::Integer(a), Value::Integer(b)) = (v1, v2) {
        a < b
    } else {
        v1.to_f64() < v2.to_f64()
    }
}

impl std::ops::Add for &Value {
    type Output = Value;

    fn add(self, other: Self) -> Value {
        if self.is_special() || other.is_special() {
            if (self.is_infinity() && other.is_negative_infinity())
                || (self.is_negative_infinity() && other.is_infinity())
            {
                return Value::NaN;
            } else if self.is_infinity() || other.is_infinity() {
                return Value::Infinity;
            } else if self.is_negative_infinity() || other.is_negative_infinity() {
                return Value::NegativeInfinity;
            }
        }
        if let (Value::Integer(a), Value::Integer(b)) = (self, other) {
            match a.checked_add(*b) {
                Some(sum) => Value::Integer(sum),
                None => Value::from(*a as f64 + *b as f64),
            }
        } else {
            Value::from(self.to_f64() + other.to_f64())
        }
    }
}

impl std::ops::Sub for &Value {
    type Output = Value;

    fn sub(self, other: Self) -> Value {
        if self.is_special() || other.is_special() {
            if (self.is_infinity() && other.is_infinity())
                || (self.is_negative_infinity() && other.is_negative_infinity())
            {
                return Value::NaN;
            } else if self.is_infinity() || other.is_negative_infinity() {
                return Value::Infinity;
            } else if self.is_negative_infinity() || other.is_infinity() {
                return Value::NegativeInfinity;
            }
        }
        if let (Value::Integer(a), Value::Integer(b)) = (self, other) {
            match a.checked_sub(*b) {
                Some(diff) => Value::Integer(diff),
                None => Value::from(*a as f64 - *b as f64),
            }
        } else {
            Value::from(self.to_f64() - other.to_f64())
        }
    }
}

impl std::ops::Mul for &Value {
    type Output = Value;

    fn mul(self, other: Self) -> Value {
        if self.is_infinity()
            || self.is_negative_infinity()
            || other.is_infinity()
            || other.is_negative_infinity()
        {
            let positive = self.is_infinity() || other.is_infinity();
            let finite = if self.is_infinity() || self.is_negative_infinity() {
                other
            } else {
                self
            };
            let zero = Value::Integer(0);
            return if greater(finite, &zero) {
                if positive {
                    Value::Infinity
                } else {
                    Value::NegativeInfinity
                }
            } else if greater(&zero, finite) {
                if positive {
                    Value::NegativeInfinity
                } else {
                    Value::Infinity
                }
            } else {
                Value::NaN
            };
        }
        if let (Value::Integer(a), Value::Integer(b)) = (self, other) {
            match a.checked_mul(*b) {
                Some(product) => Value::Integer(product),
                None => Value::from(*a as f64 * *b as f64),
            }
        } else {
            Value::from(self.to_f64() * other.to_f64())
        }
    }
}

impl std::ops::Div for &Value {
    type Output = Value;

    fn div(self, other: Self) -> Value {
        let dividend = self.to_f64();
        let divisor = other.to_f64();
        if divisor == 0.0 && !other.is_nan() {
            return if dividend == 0.0 {
                Value::NaN
            } else if dividend > 0.0 {
                Value::Infinity
            } else {
                Value::NegativeInfinity
            };
        }
        Value::from(dividend / divisor)
    }
}

impl std::ops::Rem for &Value {
    type Output = Value;

    fn rem(self, other: Self) -> Value {
        if *other == Value::Integer(0) || self.is_infinity() || self.is_negative_infinity() {
            return Value::NaN;
        }
        if other.is_infinity() || other.is_negative_infinity() {
            return Value::from(self.to_f64());
        }
        Value::from(self.to_f64() % other.to_f64())
    }
}

/// Case-insensitive string comparison (Scratch compares display strings
/// without regard to case).
pub fn strings_equal(s1: &str, s2: &str) -> bool {
    s1.chars()
        .flat_map(char::to_lowercase)
        .eq(s2.chars().flat_map(char::to_lowercase))
}

/// Whitespace-trimming string-to-number parse; anything unparsable is 0.
pub fn string_to_double(s: &str) -> f64 {
    let trimmed = s.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        "NaN" => f64::NAN,
        _ => trimmed.parse::<f64>().unwrap_or(0.0),
    }
}

/// Strict variant used where a non-number must not silently become 0.
pub fn is_valid_number(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty()
        && (matches!(trimmed, "Infinity" | "+Infinity" | "-Infinity" | "NaN")
            || trimmed.parse::<f64>().is_ok())
}

/* sb3 stores literals as either JSON numbers or strings */
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Integer(i64),
            Double(f64),
            Bool(bool),
            String(String),
        }
        Ok(match Raw::deserialize(de)? {
            Raw::Integer(integer) => Value::Integer(integer),
            Raw::Double(double) => Value::from(double),
            Raw::Bool(boolean) => Value::Bool(boolean),
            Raw::String(string) => Value::String(string),
        })
    }
}
