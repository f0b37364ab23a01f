//! Worker-side half of the protocol.
//!
//! An emulation worker written in Rust accepts one connection per request,
//! reads the request, calls back into the host as often as it needs, and
//! ends with exactly one `result` or `error` frame.

use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;

use crate::host::Breakpoint;
use crate::rpc::protocol::{decode_bytes, encode_bytes, ClientMessage, RegisterDeltas, WorkerMessage};
use crate::rpc::transport::Connection;
use crate::{Error, Result};

pub struct WorkerListener {
    listener: TcpListener,
    read_timeout: Duration,
}

impl WorkerListener {
    pub async fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Emulation worker listening on {}", listener.local_addr()?);
        Ok(Self { listener, read_timeout })
    }

    /// Adopt a listener bound elsewhere (e.g. inherited from a launcher).
    /// Must be called inside a tokio runtime.
    pub fn from_std(listener: std::net::TcpListener, read_timeout: Duration) -> Result<Self> {
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener: TcpListener::from_std(listener)?,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn accept(&self) -> Result<WorkerChannel> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!("Accepted host connection from {}", peer);
        Ok(WorkerChannel {
            conn: Connection::from_stream(stream, self.read_timeout),
        })
    }
}

pub struct WorkerChannel {
    conn: Connection,
}

impl WorkerChannel {
    /// First message on a connection. `None` if the host hung up without sending one.
    pub async fn next_request(&mut self) -> Result<Option<ClientMessage>> {
        match self.conn.recv().await? {
            Some(frame) => Ok(Some(ClientMessage::decode(&frame)?)),
            None => Ok(None),
        }
    }

    /// Invoke a host function and block until the host answers.
    pub async fn call(&mut self, function: &str, args: Vec<Value>) -> Result<Value> {
        let msg = WorkerMessage::Call { function: function.to_string(), args };
        self.conn.send(&msg.encode()?).await?;
        let frame = self.conn.recv().await?.ok_or_else(|| {
            Error::Protocol(format!("Host closed the connection during '{}'", function))
        })?;
        serde_json::from_slice(&frame)
            .map_err(|e| Error::Protocol(format!("Bad reply to '{}': {}", function, e)))
    }

    pub async fn read_register(&mut self, name: &str) -> Result<u64> {
        let value = self.call("get_reg", vec![Value::from(name)]).await?;
        value.as_u64().ok_or_else(|| {
            Error::Protocol(format!("get_reg({}) returned non-integer {}", name, value))
        })
    }

    pub async fn read_memory(&mut self, address: u64, len: usize) -> Result<Vec<u8>> {
        let value = self.call("read_mem", vec![Value::from(address), Value::from(len)]).await?;
        match value {
            Value::String(data) => decode_bytes(&data),
            other => Err(Error::Protocol(format!("read_mem returned {}", other))),
        }
    }

    pub async fn write_register(&mut self, name: &str, value: u64) -> Result<()> {
        self.call("set_reg", vec![Value::from(name), Value::from(value)]).await?;
        Ok(())
    }

    pub async fn write_memory(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.call("write_mem", vec![Value::from(address), Value::from(encode_bytes(bytes))])
            .await?;
        Ok(())
    }

    /// The host's breakpoint at `address`, if any.
    pub async fn breakpoint_at(&mut self, address: u64) -> Result<Option<Breakpoint>> {
        let value = self.call("get_bpt", vec![Value::from(address)]).await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("get_bpt({:#x}) returned {}", address, e)))
    }

    pub async fn finish(mut self, deltas: &RegisterDeltas) -> Result<()> {
        self.conn.send(&WorkerMessage::Result(deltas.clone()).encode()?).await
    }

    pub async fn fail(mut self, detail: &str) -> Result<()> {
        self.conn.send(&WorkerMessage::Error(detail.to_string()).encode()?).await
    }
}
