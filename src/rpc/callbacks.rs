//! The closed set of host functions a worker may call mid-emulation.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::protocol::{decode_bytes, encode_bytes};
use crate::host::DebugHost;
use crate::{Error, Result};

/// Largest single memory read a worker may request.
pub const MAX_READ_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    GetReg,
    SetReg,
    ReadMem,
    WriteMem,
    GetBpt,
}

impl Callback {
    pub const ALL: [Callback; 5] = [
        Self::GetReg,
        Self::SetReg,
        Self::ReadMem,
        Self::WriteMem,
        Self::GetBpt,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GetReg => "get_reg",
            Self::SetReg => "set_reg",
            Self::ReadMem => "read_mem",
            Self::WriteMem => "write_mem",
            Self::GetBpt => "get_bpt",
        }
    }

    pub fn resolve(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cb| cb.name() == name)
    }

    pub fn invoke(self, host: &mut dyn DebugHost, args: Vec<Value>) -> Result<Value> {
        match self {
            Self::GetReg => {
                let (name,): (String,) = self.parse_args(args)?;
                Ok(Value::from(host.read_register(&name)?))
            }
            Self::SetReg => {
                let (name, value): (String, u64) = self.parse_args(args)?;
                host.write_register(&name, value)?;
                Ok(Value::Bool(true))
            }
            Self::ReadMem => {
                let (address, len): (u64, usize) = self.parse_args(args)?;
                if len > MAX_READ_LEN {
                    return Err(Error::Protocol(format!(
                        "read_mem of {} bytes exceeds limit of {} bytes",
                        len, MAX_READ_LEN
                    )));
                }
                let bytes = host.read_memory(address, len)?;
                Ok(Value::String(encode_bytes(&bytes)))
            }
            Self::WriteMem => {
                let (address, data): (u64, String) = self.parse_args(args)?;
                host.write_memory(address, &decode_bytes(&data)?)?;
                Ok(Value::Bool(true))
            }
            Self::GetBpt => {
                let (address,): (u64,) = self.parse_args(args)?;
                Ok(match host.breakpoint_at(address) {
                    Some(bpt) => serde_json::to_value(bpt)?,
                    None => Value::Null,
                })
            }
        }
    }

    fn parse_args<T: DeserializeOwned>(self, args: Vec<Value>) -> Result<T> {
        serde_json::from_value(Value::Array(args)).map_err(|e| {
            Error::Protocol(format!("Bad arguments for '{}': {}", self.name(), e))
        })
    }
}

/// Look up `function` in the allow-list and run it against the host.
pub fn dispatch(host: &mut dyn DebugHost, function: &str, args: Vec<Value>) -> Result<Value> {
    let callback = Callback::resolve(function)
        .ok_or_else(|| Error::UnknownCallback(function.to_string()))?;
    tracing::debug!("callback {}({:?})", function, args);
    callback.invoke(host, args)
}
