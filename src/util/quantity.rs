//! Byte quantities that may be written with engineering prefixes
// (c) 2024 Ross Younger

use std::{fmt, marker::PhantomData, ops::Deref, str::FromStr};

use anyhow::Context as _;
use human_repr::HumanCount as _;
use humanize_rs::bytes::Bytes;
use serde::{de, Deserialize, Serialize};

/// A number of bytes, which may be written as a plain integer or with an SI suffix.
///
/// `150k`, `"150000"` and `150000` all describe the same quantity.
/// Configuration files may use either the integer or the string form.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(into = "u64")]
pub struct ByteQuantity(u64);

impl ByteQuantity {
    /// Wraps a raw byte count
    #[must_use]
    pub const fn new(bytes: u64) -> Self {
        Self(bytes)
    }
}

impl Deref for ByteQuantity {
    type Target = u64;

    fn deref(&self) -> &u64 {
        &self.0
    }
}

impl From<u64> for ByteQuantity {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ByteQuantity> for u64 {
    fn from(value: ByteQuantity) -> Self {
        value.0
    }
}

impl FromStr for ByteQuantity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = Bytes::<u64>::from_str(s.trim())
            .with_context(|| format!("invalid byte quantity {s:?}"))?;
        Ok(Self(parsed.size()))
    }
}

impl fmt::Display for ByteQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.human_count_bytes())
    }
}

/// Accepts either an integer or a string for a `T`
struct IntOrString<T>(PhantomData<fn() -> T>);

impl<T> de::Visitor<'_> for IntOrString<T>
where
    T: FromStr + From<u64>,
    <T as FromStr>::Err: fmt::Display,
{
    type Value = T;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an integer or a string such as \"150k\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<T, E> {
        T::from_str(value).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<T, E> {
        Ok(T::from(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<T, E> {
        u64::try_from(value)
            .map(T::from)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Signed(value), &self))
    }
}

impl<'de> Deserialize<'de> for ByteQuantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(IntOrString(PhantomData))
    }
}
