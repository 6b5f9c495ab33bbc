//! Serialize addresses as `0x`-prefixed hex strings.

use serde::Serializer;

pub fn serialize<S>(addr: &usize, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{addr:#x}"))
}
