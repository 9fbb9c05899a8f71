//! Length-prefixed event framing for transports without native message properties.
//!
//! Layout: `[u32 count]` then `count` pairs of `[u32 len][key][u32 len][value]`,
//! then the raw body to the end of the frame. All integers little-endian.

use crate::event::Event;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("too many properties: {0}")]
    TooManyProperties(usize),
    #[error("property field of {0} bytes exceeds frame limit")]
    FieldTooLong(usize),
}

pub fn encode_event(event: &Event) -> Result<Bytes, FrameError> {
    let count = u32::try_from(event.properties.len())
        .map_err(|_| FrameError::TooManyProperties(event.properties.len()))?;
    let props_len: usize = event
        .properties
        .iter()
        .map(|(k, v)| 8 + k.len() + v.len())
        .sum();
    let mut buf = BytesMut::with_capacity(4 + props_len + event.body.len());
    buf.put_u32_le(count);
    for (k, v) in &event.properties {
        put_str(&mut buf, k)?;
        put_str(&mut buf, v)?;
    }
    buf.extend_from_slice(&event.body);
    Ok(buf.freeze())
}

pub fn decode_event(mut buf: Bytes) -> Option<Event> {
    if buf.len() < 4 {
        return None;
    }
    let count = buf.get_u32_le();
    let mut properties = BTreeMap::new();
    for _ in 0..count {
        let k = get_str(&mut buf)?;
        let v = get_str(&mut buf)?;
        properties.insert(k, v);
    }
    Some(Event { body: buf, properties })
}

fn put_str(buf: &mut BytesMut, s: &str) -> Result<(), FrameError> {
    let len = u32::try_from(s.len()).map_err(|_| FrameError::FieldTooLong(s.len()))?;
    buf.put_u32_le(len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut Bytes) -> Option<String> {
    if buf.len() < 4 {
        return None;
    }
    let len = buf.get_u32_le() as usize;
    if buf.len() < len {
        return None;
    }
    String::from_utf8(buf.split_to(len).to_vec()).ok()
}
