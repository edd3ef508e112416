use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonicalize;
use crate::error::Result;

/// Request parameters: field name to value.
pub type Params = Map<String, Value>;

/// Outbound request, serialized as `{"method":..,"id":..,"params":{..}}`.
///
/// `params` is omitted from the wire entirely when empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub method: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Envelope {
    pub fn new(method: impl Into<String>, id: u64, params: Params) -> Self {
        Self {
            method: method.into(),
            id,
            params: (!params.is_empty()).then_some(params),
        }
    }

    /// Coerce `address` / `data` / `mask` to unsigned 32-bit words.
    pub fn canonicalize(&mut self) {
        if let Some(params) = self.params.as_mut() {
            canonicalize(params);
        }
    }

    /// Compact JSON bytes, as written to the port.
    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Build [`Params`] from `(name, value)` pairs.
pub fn params<K, V, I>(pairs: I) -> Params
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_request_wire_format() {
        let env = Envelope::new("rd", 0, params([("address", 2304)]));
        assert_eq!(
            env.to_wire().unwrap(),
            br#"{"method":"rd","id":0,"params":{"address":2304}}"#
        );
    }

    #[test]
    fn empty_params_are_omitted() {
        let env = Envelope::new("reset", 3, Params::new());
        assert_eq!(env.params, None);
        assert_eq!(env.to_wire().unwrap(), br#"{"method":"reset","id":3}"#);
    }

    #[test]
    fn canonicalize_rewrites_register_words() {
        let mut env = Envelope::new(
            "wr",
            1,
            params([("address", -1i64), ("data", 1i64 << 32)]),
        );
        env.canonicalize();
        let params = env.params.unwrap();
        assert_eq!(params["address"], Value::from(4_294_967_295u32));
        assert_eq!(params["data"], Value::from(0u32));
    }
}
