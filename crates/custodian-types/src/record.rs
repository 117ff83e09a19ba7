//! Flattened record snapshots.
//!
//! A [`Record`] is an ordered map from dotted field paths to typed
//! [`FieldValue`]s. Nested JSON objects are flattened (`{"address": {"city":
//! "x"}}` becomes `address.city`), so field-level diffs and risk rules can
//! name any leaf directly. Numbers never pass through floating point: JSON
//! fractions are parsed from their textual form into an exact [`Decimal`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::TypeError;

/// Largest supported number of fractional digits.
const MAX_SCALE: u32 = 28;

// ---------------------------------------------------------------------------
// Decimal
// ---------------------------------------------------------------------------

/// Exact base-10 number: `mantissa * 10^-scale`.
///
/// Always stored normalized (no trailing fractional zeros), so `10.50` and
/// `10.5` are the same value and compare equal structurally.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub fn new(mantissa: i128, scale: u32) -> Self {
        let (mut mantissa, mut scale) = (mantissa, scale);
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }
        if mantissa == 0 {
            scale = 0;
        }
        Self { mantissa, scale }
    }

    /// Minor currency units (e.g. cents) to a decimal amount.
    pub fn from_minor_units(units: i64, decimals: u32) -> Self {
        Self::new(units as i128, decimals)
    }

    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_integer(&self) -> bool {
        self.scale == 0
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self::new(value as i128, 0)
    }
}

impl FromStr for Decimal {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TypeError::InvalidDecimal(s.to_string());
        let trimmed = s.trim();

        let (body, exponent) = match trimmed.find(|c| c == 'e' || c == 'E') {
            Some(i) => {
                let exp = trimmed[i + 1..].parse::<i32>().map_err(|_| err())?;
                (&trimmed[..i], exp)
            }
            None => (trimmed, 0),
        };

        let (negative, digits) = match body.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, body.strip_prefix('+').unwrap_or(body)),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(err());
        }

        let mut mantissa: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(b - b'0')))
                .ok_or_else(err)?;
        }

        let mut scale = frac_part.len() as i64 - i64::from(exponent);
        if scale < 0 {
            if mantissa != 0 {
                for _ in 0..-scale {
                    mantissa = mantissa.checked_mul(10).ok_or_else(err)?;
                }
            }
            scale = 0;
        }
        // Trailing zeros beyond the limit are harmless; strip before checking.
        let normalized = Decimal::new(mantissa, scale.min(i64::from(u32::MAX)) as u32);
        if normalized.scale > MAX_SCALE {
            return Err(err());
        }

        Ok(if negative {
            Decimal::new(-normalized.mantissa, normalized.scale)
        } else {
            normalized
        })
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        let width = self.scale as usize + 1;
        let padded = format!("{digits:0>width$}");
        let split = padded.len() - self.scale as usize;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(f, "{sign}{}.{}", &padded[..split], &padded[split..])
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({self})")
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Decimal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// Type family of a field value. Integers and decimals share `Number`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Null,
    Bool,
    Number,
    Text,
    List,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::Text => "text",
            Self::List => "list",
        };
        f.write_str(s)
    }
}

/// A single leaf value in a [`Record`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Decimal(Decimal),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Null => FieldKind::Null,
            Self::Bool(_) => FieldKind::Bool,
            Self::Integer(_) | Self::Decimal(_) => FieldKind::Number,
            Self::Text(_) => FieldKind::Text,
            Self::List(_) => FieldKind::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Value equality across representations: `Integer(10)` equals
    /// `Decimal(10.00)`, lists compare element-wise by the same rule.
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Decimal(b)) | (Self::Decimal(b), Self::Integer(a)) => {
                Decimal::from(*a) == *b
            }
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_value(y))
            }
            _ => self == other,
        }
    }

    fn from_json(value: &Value) -> Result<Self, TypeError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Decimal(n.to_string().parse()?),
            },
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(
                items
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            // Objects nested inside lists cannot be path-addressed; keep them
            // as canonical JSON text so equality stays well-defined.
            Value::Object(_) => Self::Text(
                serde_json::to_string(value).map_err(|e| TypeError::Serialization(e.to_string()))?,
            ),
        })
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Full-state snapshot of a protected record, keyed by dotted field path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, FieldValue>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &BTreeMap<String, FieldValue> {
        &self.0
    }

    /// Flatten a JSON object into a record. The root must be an object.
    pub fn from_json(value: &Value) -> Result<Self, TypeError> {
        let Value::Object(_) = value else {
            return Err(TypeError::NotAnObject(json_kind(value).into()));
        };
        let mut out = BTreeMap::new();
        flatten_into("", value, &mut out)?;
        Ok(Self(out))
    }

    /// Serialize any value with serde and flatten the result.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self, TypeError> {
        let json =
            serde_json::to_value(value).map_err(|e| TypeError::Serialization(e.to_string()))?;
        Self::from_json(&json)
    }

    /// Deterministic byte encoding used for hashing (keys are sorted).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

impl FromIterator<(String, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn flatten_into(
    prefix: &str,
    value: &Value,
    out: &mut BTreeMap<String, FieldValue>,
) -> Result<(), TypeError> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, child, out)?;
            }
        }
        leaf => {
            out.insert(prefix.to_string(), FieldValue::from_json(leaf)?);
        }
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
