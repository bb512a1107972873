//! Wrapper types for values that must never appear in logs or `Debug`
//! output: API keys, OAuth client secrets, webhook secrets, card tokens and
//! signed request bodies.
//!
//! A [`Secret`] prints its masking strategy's placeholder instead of the
//! inner value. Read access is explicit: [`PeekInterface::peek`] borrows the
//! value, [`ExposeInterface::expose`] consumes the wrapper.

#![warn(missing_docs, missing_debug_implementations)]

use std::{fmt, marker::PhantomData};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How a masked value renders in `Debug`/`Display` contexts.
pub trait Strategy<T> {
    /// Write the masked representation of `val`.
    fn fmt(val: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

/// Default masking strategy: prints only the type name of the secret.
#[derive(Debug)]
pub enum WithType {}

impl<T> Strategy<T> for WithType {
    fn fmt(_val: &T, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("*** ")?;
        f.write_str(std::any::type_name::<T>())?;
        f.write_str(" ***")
    }
}

/// A value guarded against accidental display.
///
/// The only ways to the inner value are [`PeekInterface::peek`] and
/// [`ExposeInterface::expose`], both of which are easy to grep for in
/// review.
pub struct Secret<S, I = WithType>
where
    I: Strategy<S>,
{
    inner_secret: S,
    masking_strategy: PhantomData<I>,
}

impl<S, I> Secret<S, I>
where
    I: Strategy<S>,
{
    /// Take ownership of a secret value.
    pub fn new(secret: S) -> Self {
        Self {
            inner_secret: secret,
            masking_strategy: PhantomData,
        }
    }
}

/// Borrow the inner value of a secret.
pub trait PeekInterface<S> {
    /// Borrow the guarded value.
    fn peek(&self) -> &S;
}

/// Consume a wrapper and return the inner value.
pub trait ExposeInterface<S> {
    /// Consume the wrapper.
    fn expose(self) -> S;
}

impl<S, I> PeekInterface<S> for Secret<S, I>
where
    I: Strategy<S>,
{
    fn peek(&self) -> &S {
        &self.inner_secret
    }
}

impl<S, I> ExposeInterface<S> for Secret<S, I>
where
    I: Strategy<S>,
{
    fn expose(self) -> S {
        self.inner_secret
    }
}

impl<S, I> From<S> for Secret<S, I>
where
    I: Strategy<S>,
{
    fn from(secret: S) -> Self {
        Self::new(secret)
    }
}

impl<S, I> Clone for Secret<S, I>
where
    S: Clone,
    I: Strategy<S>,
{
    fn clone(&self) -> Self {
        Self::new(self.inner_secret.clone())
    }
}

impl<S, I> PartialEq for Secret<S, I>
where
    S: PartialEq,
    I: Strategy<S>,
{
    fn eq(&self, other: &Self) -> bool {
        self.peek().eq(other.peek())
    }
}

impl<S, I> Eq for Secret<S, I>
where
    S: Eq,
    I: Strategy<S>,
{
}

impl<S, I> fmt::Debug for Secret<S, I>
where
    I: Strategy<S>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        I::fmt(&self.inner_secret, f)
    }
}

impl<S, I> Default for Secret<S, I>
where
    S: Default,
    I: Strategy<S>,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

// Secrets ride inside vendor request and response bodies, so serde passes
// the inner value through. Masking applies to Debug, not to the wire.
impl<S, I> Serialize for Secret<S, I>
where
    S: Serialize,
    I: Strategy<S>,
{
    fn serialize<Sr: Serializer>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error> {
        self.inner_secret.serialize(serializer)
    }
}

impl<'de, S, I> Deserialize<'de> for Secret<S, I>
where
    S: Deserialize<'de>,
    I: Strategy<S>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        S::deserialize(deserializer).map(Self::new)
    }
}

/// A header or parameter value that may or may not be sensitive.
///
/// Lets request builders accumulate `Authorization: <key>` next to
/// `Content-Type: application/json` in one collection while keeping `Debug`
/// output safe.
#[derive(Clone, Eq, PartialEq)]
pub enum Maskable<T> {
    /// Value that must stay masked in any rendered output.
    Masked(Secret<T>),
    /// Plain value.
    Normal(T),
}

impl<T> Maskable<T> {
    /// Unwrap the value regardless of masking, for writing to the wire.
    pub fn into_inner(self) -> T {
        match self {
            Self::Masked(secret) => secret.expose(),
            Self::Normal(value) => value,
        }
    }

    /// Whether this value is masked.
    pub fn is_masked(&self) -> bool {
        matches!(self, Self::Masked(_))
    }
}

impl<T: fmt::Debug> fmt::Debug for Maskable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Masked(secret) => fmt::Debug::fmt(secret, f),
            Self::Normal(value) => fmt::Debug::fmt(value, f),
        }
    }
}

impl<T> From<T> for Maskable<T> {
    fn from(value: T) -> Self {
        Self::Normal(value)
    }
}

impl<T> From<Secret<T>> for Maskable<T> {
    fn from(value: Secret<T>) -> Self {
        Self::Masked(value)
    }
}

impl From<&str> for Maskable<String> {
    fn from(value: &str) -> Self {
        Self::Normal(value.to_owned())
    }
}

/// Conversion into a masked [`Maskable`].
pub trait Mask {
    /// The wrapped type.
    type Output;
    /// Wrap `self` as a masked value.
    fn into_masked(self) -> Maskable<Self::Output>;
}

impl Mask for String {
    type Output = Self;
    fn into_masked(self) -> Maskable<Self> {
        Maskable::Masked(Secret::new(self))
    }
}

impl Mask for Secret<String> {
    type Output = String;
    fn into_masked(self) -> Maskable<String> {
        Maskable::Masked(self)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn debug_output_is_masked() {
        let secret: Secret<String> = Secret::new("sk_live_abcdef".to_string());
        let rendered = format!("{secret:?}");
        assert!(!rendered.contains("sk_live_abcdef"));
        assert!(rendered.contains("String"));
    }

    #[test]
    fn peek_and_expose_return_the_value() {
        let secret: Secret<String> = Secret::new("whsec_123".to_string());
        assert_eq!(secret.peek(), "whsec_123");
        assert_eq!(secret.expose(), "whsec_123");
    }

    #[test]
    fn maskable_debug_hides_masked_values_only() {
        let masked: Maskable<String> = "api_key_value".to_string().into_masked();
        let normal: Maskable<String> = "application/json".into();
        assert!(!format!("{masked:?}").contains("api_key_value"));
        assert!(format!("{normal:?}").contains("application/json"));
    }

    #[test]
    fn serde_round_trips_inner_value() {
        let secret: Secret<String> = Secret::new("tok_456".to_string());
        let json = serde_json::to_string(&secret).expect("serialize");
        assert_eq!(json, "\"tok_456\"");
        let back: Secret<String> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.peek(), "tok_456");
    }
}
