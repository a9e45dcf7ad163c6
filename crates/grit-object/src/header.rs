//! The `<type> SP <size-in-decimal> NUL` prefix of every stored object.

use crate::{ObjectError, ObjectType};

/// Serialize an object header.
pub fn write_header(ty: ObjectType, size: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(ty.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(size.to_string().as_bytes());
    out.push(0);
    out
}

/// Parse an object header, returning `(type, size, header_len)`.
pub fn parse_header(data: &[u8]) -> Result<(ObjectType, usize, usize), ObjectError> {
    let space = data
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::InvalidHeader("missing space".into()))?;
    let nul = data[space..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| p + space)
        .ok_or_else(|| ObjectError::InvalidHeader("missing NUL".into()))?;

    let ty = ObjectType::from_bytes(&data[..space])?;
    let size_text = std::str::from_utf8(&data[space + 1..nul])
        .map_err(|_| ObjectError::InvalidHeader("non-UTF8 size".into()))?;
    let size: usize = size_text
        .parse()
        .map_err(|_| ObjectError::InvalidHeader(format!("bad size: {size_text}")))?;

    Ok((ty, size, nul + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = write_header(ObjectType::Blob, 1234);
        assert_eq!(header, b"blob 1234\0");
        let (ty, size, len) = parse_header(&header).unwrap();
        assert_eq!(ty, ObjectType::Blob);
        assert_eq!(size, 1234);
        assert_eq!(len, header.len());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(parse_header(b"tag 12\0").is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(parse_header(b"blob 12").is_err());
        assert!(parse_header(b"blob12\0").is_err());
    }
}
