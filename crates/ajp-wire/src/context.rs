//! AJP14 context discovery and state messages
//!
//! Lists are terminated by an empty string:
//!
//! ```text
//! CONTEXT_QUERY        vhost
//! CONTEXT_INFO         vhost { context { uri }* "" }* ""
//! CONTEXT_STATE        vhost { context }* ""
//! CONTEXT_STATE_REPLY  vhost { context u16 status }* ""
//! CONTEXT_UPDATE       same layout as CONTEXT_STATE_REPLY
//! ```

use crate::buffer::WireBuffer;
use crate::command::ajp14;
use crate::error::{Result, WireError};
use crate::login::expect_command;

/// Request for the contexts a backend serves on a virtual host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextQuery {
    /// Virtual host name; `*` for all
    pub virtual_host: String,
}

impl ContextQuery {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::CONTEXT_QUERY)?;
        buf.append_string(Some(&self.virtual_host))
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::CONTEXT_QUERY)?;
        Ok(Self {
            virtual_host: buf.get_required_string("virtual host")?,
        })
    }
}

/// One web application and the URI patterns it serves
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextEntry {
    /// Context base, e.g. `/examples`
    pub name: String,
    /// URI patterns mapped to this context
    pub uris: Vec<String>,
}

/// Contexts a backend serves on a virtual host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextInfo {
    /// Virtual host the entries belong to
    pub virtual_host: String,
    /// Served contexts
    pub contexts: Vec<ContextEntry>,
}

/// Next list item; `None` at the empty terminator
fn get_list_item(buf: &mut WireBuffer, field: &'static str) -> Result<Option<String>> {
    let item = buf.get_required_string(field)?;
    Ok((!item.is_empty()).then_some(item))
}

impl ContextInfo {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::CONTEXT_INFO)?;
        buf.append_string(Some(&self.virtual_host))?;
        for entry in &self.contexts {
            buf.append_string(Some(&entry.name))?;
            for uri in &entry.uris {
                buf.append_string(Some(uri))?;
            }
            buf.append_string(Some(""))?;
        }
        buf.append_string(Some(""))
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::CONTEXT_INFO)?;
        let mut info = Self {
            virtual_host: buf.get_required_string("virtual host")?,
            contexts: Vec::new(),
        };
        while let Some(name) = get_list_item(buf, "context")? {
            let mut entry = ContextEntry {
                name,
                uris: Vec::new(),
            };
            while let Some(uri) = get_list_item(buf, "uri")? {
                entry.uris.push(uri);
            }
            info.contexts.push(entry);
        }
        Ok(info)
    }
}

/// Request for the state of named contexts
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextStateQuery {
    /// Virtual host the contexts belong to
    pub virtual_host: String,
    /// Contexts to report on
    pub contexts: Vec<String>,
}

impl ContextStateQuery {
    /// Write the payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        buf.reset();
        buf.append_byte(ajp14::CONTEXT_STATE)?;
        buf.append_string(Some(&self.virtual_host))?;
        for name in &self.contexts {
            buf.append_string(Some(name))?;
        }
        buf.append_string(Some(""))
    }

    /// Read the payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        expect_command(buf, ajp14::CONTEXT_STATE)?;
        let mut query = Self {
            virtual_host: buf.get_required_string("virtual host")?,
            contexts: Vec::new(),
        };
        while let Some(name) = get_list_item(buf, "context")? {
            query.contexts.push(name);
        }
        Ok(query)
    }
}

/// Availability of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextStatus {
    /// Context stopped
    Down,
    /// Context running
    Up,
    /// Context running and healthy
    Ok,
    /// Status code outside the known set
    Unknown(u16),
}

impl From<u16> for ContextStatus {
    fn from(code: u16) -> Self {
        match code {
            1 => Self::Down,
            2 => Self::Up,
            3 => Self::Ok,
            other => Self::Unknown(other),
        }
    }
}

impl From<ContextStatus> for u16 {
    fn from(status: ContextStatus) -> Self {
        match status {
            ContextStatus::Down => 1,
            ContextStatus::Up => 2,
            ContextStatus::Ok => 3,
            ContextStatus::Unknown(code) => code,
        }
    }
}

/// Context states reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContextStateReply {
    /// Virtual host the contexts belong to
    pub virtual_host: String,
    /// State per context
    pub states: Vec<(String, ContextStatus)>,
}

impl ContextStateReply {
    /// Write a CONTEXT_STATE_REPLY payload
    pub fn encode(&self, buf: &mut WireBuffer) -> Result<()> {
        self.encode_as(buf, ajp14::CONTEXT_STATE_REPLY)
    }

    /// Write a CONTEXT_UPDATE payload
    pub fn encode_update(&self, buf: &mut WireBuffer) -> Result<()> {
        self.encode_as(buf, ajp14::CONTEXT_UPDATE)
    }

    fn encode_as(&self, buf: &mut WireBuffer, command: u8) -> Result<()> {
        buf.reset();
        buf.append_byte(command)?;
        buf.append_string(Some(&self.virtual_host))?;
        for (name, status) in &self.states {
            buf.append_string(Some(name))?;
            buf.append_int(u16::from(*status))?;
        }
        buf.append_string(Some(""))
    }

    /// Read a CONTEXT_STATE_REPLY or CONTEXT_UPDATE payload
    pub fn decode(buf: &mut WireBuffer) -> Result<Self> {
        match buf.get_byte()? {
            ajp14::CONTEXT_STATE_REPLY | ajp14::CONTEXT_UPDATE => {}
            got => {
                return Err(WireError::UnexpectedCommand {
                    expected: ajp14::CONTEXT_STATE_REPLY,
                    got,
                });
            }
        }
        let mut reply = Self {
            virtual_host: buf.get_required_string("virtual host")?,
            states: Vec::new(),
        };
        while let Some(name) = get_list_item(buf, "context")? {
            let status = ContextStatus::from(buf.get_int()?);
            reply.states.push((name, status));
        }
        Ok(reply)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::frame::AJP14_MAGIC;
    use pretty_assertions::assert_eq;

    fn loopback(tx: &mut WireBuffer) -> WireBuffer {
        tx.finalize(AJP14_MAGIC).expect("Operation should succeed");
        let mut rx = WireBuffer::new(tx.capacity());
        rx.load(tx.frame(), AJP14_MAGIC).expect("Operation should succeed");
        rx
    }

    #[test]
    fn test_context_info_round_trip() {
        let info = ContextInfo {
            virtual_host: "*".to_string(),
            contexts: vec![
                ContextEntry {
                    name: "/examples".to_string(),
                    uris: vec!["/examples/*".to_string(), "*.jsp".to_string()],
                },
                ContextEntry {
                    name: "/manager".to_string(),
                    uris: vec![],
                },
            ],
        };
        let mut tx = WireBuffer::new(256);
        info.encode(&mut tx).unwrap();
        let mut rx = loopback(&mut tx);
        assert_eq!(ContextInfo::decode(&mut rx).unwrap(), info);
        assert_eq!(rx.remaining(), 0);
    }

    #[test]
    fn test_missing_terminator_fails() {
        let mut tx = WireBuffer::new(64);
        tx.append_byte(ajp14::CONTEXT_INFO).unwrap();
        tx.append_string(Some("*")).unwrap();
        tx.append_string(Some("/app")).unwrap();
        let mut rx = loopback(&mut tx);
        assert!(matches!(
            ContextInfo::decode(&mut rx),
            Err(WireError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn test_state_query_and_reply() {
        let query = ContextStateQuery {
            virtual_host: "www.example.com".to_string(),
            contexts: vec!["/a".to_string(), "/b".to_string()],
        };
        let mut tx = WireBuffer::new(128);
        query.encode(&mut tx).unwrap();
        let mut rx = loopback(&mut tx);
        assert_eq!(ContextStateQuery::decode(&mut rx).unwrap(), query);

        let reply = ContextStateReply {
            virtual_host: "www.example.com".to_string(),
            states: vec![
                ("/a".to_string(), ContextStatus::Up),
                ("/b".to_string(), ContextStatus::Down),
            ],
        };
        reply.encode(&mut tx).unwrap();
        let mut rx = loopback(&mut tx);
        assert_eq!(ContextStateReply::decode(&mut rx).unwrap(), reply);

        reply.encode_update(&mut tx).unwrap();
        assert_eq!(tx.payload()[0], ajp14::CONTEXT_UPDATE);
        let mut rx = loopback(&mut tx);
        assert_eq!(ContextStateReply::decode(&mut rx).unwrap(), reply);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ContextStatus::from(3), ContextStatus::Ok);
        assert_eq!(ContextStatus::from(9), ContextStatus::Unknown(9));
        assert_eq!(u16::from(ContextStatus::Down), 1);
    }
}
