use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::foundation::error::{ArgentumError, ArgentumResult};

/// A versioned parameter blob for one IOP instance.
///
/// The payload is canonical JSON so it can be hashed, persisted by the
/// shell, and edited field-by-field through the introspection schema
/// without a typed re-parse.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParamsBlob {
    /// Schema version the payload was written with.
    pub version: u32,
    /// Field values.
    pub values: serde_json::Value,
}

impl ParamsBlob {
    /// Wrap a typed params struct.
    pub fn from_typed<T: Serialize>(version: u32, params: &T) -> ArgentumResult<Self> {
        Ok(Self {
            version,
            values: serde_json::to_value(params)
                .map_err(|e| ArgentumError::validation(format!("params serialize: {e}")))?,
        })
    }

    /// Deserialize into the module's typed params.
    pub fn typed<T: DeserializeOwned>(&self) -> ArgentumResult<T> {
        serde_json::from_value(self.values.clone())
            .map_err(|e| ArgentumError::validation(format!("params deserialize: {e}")))
    }

    /// Read one numeric field without a full re-parse.
    pub fn get_field(&self, name: &str) -> Option<f64> {
        self.values.get(name)?.as_f64()
    }

    /// Write one numeric field, clamped to the schema's declared range.
    pub fn set_field(&mut self, schema: &[ParamField], name: &str, value: f64) -> ArgentumResult<()> {
        let field = schema
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ArgentumError::validation(format!("unknown param field `{name}`")))?;
        let clamped = value.clamp(field.min, field.max);

        let obj = self
            .values
            .as_object_mut()
            .ok_or_else(|| ArgentumError::validation("params payload is not an object"))?;
        let json_value = match field.kind {
            ParamKind::Int => serde_json::json!(clamped.round() as i64),
            ParamKind::Float => serde_json::json!(clamped),
            ParamKind::Bool => serde_json::json!(clamped != 0.0),
        };
        obj.insert(name.to_string(), json_value);
        Ok(())
    }
}

/// Field type in the introspection schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
    Bool,
}

/// One declared parameter field: name, type, range, default.
#[derive(Clone, Copy, Debug)]
pub struct ParamField {
    /// Field name as it appears in the blob.
    pub name: &'static str,
    /// Value type.
    pub kind: ParamKind,
    /// Minimum (inclusive).
    pub min: f64,
    /// Maximum (inclusive).
    pub max: f64,
    /// Default value.
    pub default: f64,
}

impl ParamField {
    pub const fn float(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float,
            min,
            max,
            default,
        }
    }

    pub const fn int(name: &'static str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Int,
            min,
            max,
            default,
        }
    }
}
