//! Custom serde implementations for vendor wire formats.

/// Unix-seconds timestamps, as sent by the card-rail and tokenized-recurring
/// processors.
pub mod timestamp {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{OffsetDateTime, PrimitiveDateTime};

    /// Serialize a [`PrimitiveDateTime`] as seconds since the Unix epoch.
    pub fn serialize<S: Serializer>(
        date_time: &PrimitiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(date_time.assume_utc().unix_timestamp())
    }

    /// Deserialize seconds since the Unix epoch into a [`PrimitiveDateTime`].
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<PrimitiveDateTime, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        let utc = OffsetDateTime::from_unix_timestamp(seconds)
            .map_err(|err| serde::de::Error::custom(err.to_string()))?;
        Ok(PrimitiveDateTime::new(utc.date(), utc.time()))
    }

    /// Same as [`mod@super::timestamp`] for `Option<PrimitiveDateTime>`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::{OffsetDateTime, PrimitiveDateTime};

        #[allow(missing_docs)]
        pub fn serialize<S: Serializer>(
            date_time: &Option<PrimitiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date_time {
                Some(value) => serializer.serialize_some(&value.assume_utc().unix_timestamp()),
                None => serializer.serialize_none(),
            }
        }

        #[allow(missing_docs)]
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<PrimitiveDateTime>, D::Error> {
            Option::<i64>::deserialize(deserializer)?
                .map(|seconds| {
                    OffsetDateTime::from_unix_timestamp(seconds)
                        .map(|utc| PrimitiveDateTime::new(utc.date(), utc.time()))
                        .map_err(|err| serde::de::Error::custom(err.to_string()))
                })
                .transpose()
        }
    }
}
