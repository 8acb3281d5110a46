// Serde helpers for the JSON form of blocks and transactions.

/// Byte vectors as bare hex strings, with or without a `0x` prefix on input.
pub mod hex_bytes {
    use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        hex::decode(value.trim_start_matches("0x"))
            .map_err(|err| SerdeError::custom(format!("invalid hex: {err}")))
    }
}

/// `u64` values carried as decimal strings, the way block headers arrive from peers.
pub mod quoted_u64 {
    use serde::{de::Error as SerdeError, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum QuotedOrPlain {
        Quoted(String),
        Plain(u64),
    }

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match QuotedOrPlain::deserialize(deserializer)? {
            QuotedOrPlain::Plain(value) => Ok(value),
            QuotedOrPlain::Quoted(value) => value
                .parse::<u64>()
                .map_err(|err| SerdeError::custom(format!("invalid u64: {err}"))),
        }
    }
}
