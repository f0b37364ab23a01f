use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::host::Bitness;
use crate::{Error, Result};

pub const TAG_EMU: &str = "emu";
pub const TAG_RESULT: &str = "result";
pub const TAG_ERROR: &str = "error";
pub const TAG_QUIT: &str = "quit";

/// A register name and the value it took after one emulated instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, u64)", into = "(String, u64)")]
pub struct RegisterDelta {
    pub name: String,
    pub value: u64,
}

impl RegisterDelta {
    pub fn new(name: impl Into<String>, value: u64) -> Self {
        Self { name: name.into(), value }
    }
}

impl From<(String, u64)> for RegisterDelta {
    fn from((name, value): (String, u64)) -> Self {
        Self { name, value }
    }
}

impl From<RegisterDelta> for (String, u64) {
    fn from(d: RegisterDelta) -> Self {
        (d.name, d.value)
    }
}

/// Register changes per executed instruction address.
pub type RegisterDeltas = BTreeMap<u64, Vec<RegisterDelta>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulationRequest {
    pub address: u64,
    pub code: Vec<u8>,
    pub bitness: Bitness,
    pub verbose: bool,
}

/// Messages the host sends to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Emulate(EmulationRequest),
    Quit,
}

impl ClientMessage {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Emulate(req) => serde_json::json!([
                TAG_EMU,
                [req.address, encode_bytes(&req.code), req.bitness.bits(), req.verbose]
            ]),
            Self::Quit => serde_json::json!([TAG_QUIT, [0, 0, 0, 0]]),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (tag, payload) = split_tagged(bytes)?;
        match tag.as_str() {
            TAG_EMU => {
                let (address, code, bits, verbose): (u64, String, u64, bool) =
                    serde_json::from_value(payload)
                        .map_err(|e| Error::Protocol(format!("Malformed emu payload: {}", e)))?;
                let bitness = Bitness::from_bits(bits)
                    .ok_or_else(|| Error::Protocol(format!("Unsupported bit width {}", bits)))?;
                Ok(Self::Emulate(EmulationRequest {
                    address,
                    code: decode_bytes(&code)?,
                    bitness,
                    verbose,
                }))
            }
            TAG_QUIT => Ok(Self::Quit),
            other => Err(Error::Protocol(format!("Unexpected client message '{}'", other))),
        }
    }
}

/// Messages the worker sends to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Call { function: String, args: Vec<Value> },
    Result(RegisterDeltas),
    Error(String),
}

impl WorkerMessage {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Call { function, args } => serde_json::json!([function, args]),
            Self::Result(deltas) => {
                let entries: Vec<(u64, &Vec<RegisterDelta>)> =
                    deltas.iter().map(|(addr, regs)| (*addr, regs)).collect();
                serde_json::json!([TAG_RESULT, entries])
            }
            Self::Error(detail) => serde_json::json!([TAG_ERROR, detail]),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_value())?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (tag, payload) = split_tagged(bytes)?;
        if tag == TAG_RESULT {
            return Ok(Self::Result(decode_deltas(payload)?));
        }
        if tag == TAG_ERROR {
            return Ok(Self::Error(match payload {
                Value::String(s) => s,
                other => other.to_string(),
            }));
        }
        match payload {
            Value::Array(args) => Ok(Self::Call { function: tag, args }),
            Value::Null => Ok(Self::Call { function: tag, args: Vec::new() }),
            other => Err(Error::Protocol(format!(
                "Arguments for '{}' must be an array, got {}",
                tag, other
            ))),
        }
    }
}

fn split_tagged(bytes: &[u8]) -> Result<(String, Value)> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::Protocol(format!("Frame is not valid JSON: {}", e)))?;
    match value {
        Value::Array(mut items) if items.len() == 2 => {
            let payload = items.pop().unwrap_or(Value::Null);
            match items.pop() {
                Some(Value::String(tag)) => Ok((tag, payload)),
                _ => Err(Error::Protocol("Message tag must be a string".to_string())),
            }
        }
        other => Err(Error::Protocol(format!(
            "Expected a [tag, payload] pair, got {}",
            other
        ))),
    }
}

fn decode_deltas(payload: Value) -> Result<RegisterDeltas> {
    if payload.is_null() {
        return Ok(RegisterDeltas::new());
    }
    let entries: Vec<(u64, Vec<RegisterDelta>)> = serde_json::from_value(payload)
        .map_err(|e| Error::Protocol(format!("Malformed result payload: {}", e)))?;
    let mut deltas = RegisterDeltas::new();
    for (address, regs) in entries {
        deltas.entry(address).or_default().extend(regs);
    }
    Ok(deltas)
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_bytes(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| Error::Protocol(format!("Invalid base64 bytes: {}", e)))
}
