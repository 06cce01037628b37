//! Keyring wire protocol.
//!
//! All integers are big-endian.
//!
//! ```text
//! request   op:u8  id_len:u16  id[id_len]  [secret_len:u32  secret]   (secret only for 'U')
//! response  status:u8  [secret_len:u32  secret]                       (secret only for OK reads)
//! ```
//!
//! Ops: `R` read-secret, `U` update-secret, `P` ping.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use zeroize::Zeroize;

use crate::error::SecretError;
use crate::passphrase::{Passphrase, MAX_PASSPHRASE_LEN};

pub const OP_READ: u8 = b'R';
pub const OP_UPDATE: u8 = b'U';
pub const OP_PING: u8 = b'P';

/// Longest location identifier on the wire
pub const MAX_LOCATION_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    NotConfigured = 1,
    StoreUnreadable = 2,
    TooLarge = 3,
    ForbiddenByte = 4,
    WriteIncomplete = 5,
    BadRequest = 6,
}

impl TryFrom<u8> for Status {
    type Error = SecretError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Status::Ok,
            1 => Status::NotConfigured,
            2 => Status::StoreUnreadable,
            3 => Status::TooLarge,
            4 => Status::ForbiddenByte,
            5 => Status::WriteIncomplete,
            6 => Status::BadRequest,
            other => return Err(SecretError::Protocol(format!("unknown status byte {other}"))),
        })
    }
}

#[derive(Debug)]
pub enum Request {
    Read { location: String },
    Update { location: String, secret: Passphrase },
    Ping,
}

impl Request {
    fn op(&self) -> u8 {
        match self {
            Request::Read { .. } => OP_READ,
            Request::Update { .. } => OP_UPDATE,
            Request::Ping => OP_PING,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Request::Read { location } | Request::Update { location, .. } => location,
            Request::Ping => "",
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: Status,
    pub secret: Option<Passphrase>,
}

impl Response {
    pub fn ok() -> Self {
        Response {
            status: Status::Ok,
            secret: None,
        }
    }

    pub fn secret(secret: Passphrase) -> Self {
        Response {
            status: Status::Ok,
            secret: Some(secret),
        }
    }

    pub fn failed(status: Status) -> Self {
        Response { status, secret: None }
    }
}

/// Move `len` bytes out of `src` into a validated passphrase, wiping the
/// intermediate buffer.
fn take_secret(src: &mut BytesMut, len: usize) -> Result<Passphrase, SecretError> {
    let mut chunk = src.split_to(len);
    let secret = Passphrase::new(chunk.to_vec());
    chunk.as_mut().zeroize();
    secret
}

fn peek_u16(src: &[u8], at: usize) -> usize {
    u16::from_be_bytes([src[at], src[at + 1]]) as usize
}

fn peek_u32(src: &[u8], at: usize) -> usize {
    u32::from_be_bytes([src[at], src[at + 1], src[at + 2], src[at + 3]]) as usize
}

/// Client half: encodes requests, decodes responses.
///
/// Remembers the op of the last request so an OK response to a read knows to
/// expect a secret.
#[derive(Debug, Default)]
pub struct ClientCodec {
    pending: Option<u8>,
}

impl Encoder<Request> for ClientCodec {
    type Error = SecretError;

    fn encode(&mut self, request: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let location = request.location().as_bytes();
        if location.len() > MAX_LOCATION_LEN {
            return Err(SecretError::BadRequest(format!(
                "location is {} bytes, limit {MAX_LOCATION_LEN}",
                location.len()
            )));
        }
        dst.reserve(3 + location.len());
        dst.put_u8(request.op());
        dst.put_u16(location.len() as u16);
        dst.put_slice(location);
        if let Request::Update { secret, .. } = &request {
            dst.reserve(4 + secret.len());
            dst.put_u32(secret.len() as u32);
            dst.put_slice(secret.expose());
        }
        self.pending = Some(request.op());
        Ok(())
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = SecretError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let status = Status::try_from(src[0])?;
        if status != Status::Ok || self.pending != Some(OP_READ) {
            src.advance(1);
            self.pending = None;
            return Ok(Some(Response::failed(status)));
        }

        if src.len() < 5 {
            src.reserve(5 - src.len());
            return Ok(None);
        }
        let len = peek_u32(src, 1);
        if len > MAX_PASSPHRASE_LEN {
            return Err(SecretError::TooLarge);
        }
        if src.len() < 5 + len {
            src.reserve(5 + len - src.len());
            return Ok(None);
        }
        src.advance(5);
        self.pending = None;
        Ok(Some(Response::secret(take_secret(src, len)?)))
    }
}

/// Server half: decodes requests, encodes responses.
#[derive(Debug, Default)]
pub struct ServerCodec;

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = SecretError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 3 {
            return Ok(None);
        }
        let op = src[0];
        if !matches!(op, OP_READ | OP_UPDATE | OP_PING) {
            return Err(SecretError::BadRequest(format!("unknown op byte {op:#04x}")));
        }
        let id_len = peek_u16(src, 1);
        let header = 3 + id_len;
        if src.len() < header {
            src.reserve(header - src.len());
            return Ok(None);
        }

        let secret_len = if op == OP_UPDATE {
            if src.len() < header + 4 {
                src.reserve(header + 4 - src.len());
                return Ok(None);
            }
            let len = peek_u32(src, header);
            if len > MAX_PASSPHRASE_LEN {
                return Err(SecretError::TooLarge);
            }
            if src.len() < header + 4 + len {
                src.reserve(header + 4 + len - src.len());
                return Ok(None);
            }
            Some(len)
        } else {
            None
        };

        src.advance(3);
        let id = src.split_to(id_len);
        let location = String::from_utf8(id.to_vec())
            .map_err(|_| SecretError::BadRequest("location is not UTF-8".into()))?;

        let request = match (op, secret_len) {
            (OP_READ, _) => Request::Read { location },
            (OP_UPDATE, Some(len)) => {
                src.advance(4);
                Request::Update {
                    location,
                    secret: take_secret(src, len)?,
                }
            }
            _ => Request::Ping,
        };
        Ok(Some(request))
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = SecretError;

    fn encode(&mut self, response: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_u8(response.status as u8);
        if let Some(secret) = &response.secret {
            dst.reserve(4 + secret.len());
            dst.put_u32(secret.len() as u32);
            dst.put_slice(secret.expose());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passphrase(s: &str) -> Passphrase {
        Passphrase::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn request_layout() {
        let mut buf = BytesMut::new();
        ClientCodec::default()
            .encode(
                Request::Update {
                    location: "db".into(),
                    secret: passphrase("pw"),
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(&buf[..], b"U\x00\x02db\x00\x00\x00\x02pw");
    }

    #[test]
    fn server_decodes_partial_frames() {
        let wire = b"R\x00\x07default";
        let mut codec = ServerCodec;
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none());
            } else {
                match decoded {
                    Some(Request::Read { location }) => assert_eq!(location, "default"),
                    other => panic!("unexpected {other:?}"),
                }
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn server_decodes_back_to_back_requests() {
        let mut buf = BytesMut::from(&b"P\x00\x00U\x00\x01x\x00\x00\x00\x03abc"[..]);
        let mut codec = ServerCodec;
        assert!(matches!(codec.decode(&mut buf).unwrap(), Some(Request::Ping)));
        match codec.decode(&mut buf).unwrap() {
            Some(Request::Update { location, secret }) => {
                assert_eq!(location, "x");
                assert_eq!(secret.expose(), b"abc");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn server_rejects_oversize_update_before_buffering() {
        let mut buf = BytesMut::from(&b"U\x00\x01x\x00\x00\x10\x01"[..]);
        assert!(matches!(ServerCodec.decode(&mut buf), Err(SecretError::TooLarge)));
    }

    #[test]
    fn server_rejects_unknown_op() {
        let mut buf = BytesMut::from(&b"Z\x00\x00"[..]);
        assert!(matches!(ServerCodec.decode(&mut buf), Err(SecretError::BadRequest(_))));
    }

    #[test]
    fn client_reads_secret_response() {
        let mut codec = ClientCodec::default();
        let mut out = BytesMut::new();
        codec
            .encode(Request::Read { location: "a".into() }, &mut out)
            .unwrap();

        let mut buf = BytesMut::new();
        ServerCodec.encode(Response::secret(passphrase("s3cret")), &mut buf).unwrap();
        let response = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.secret.unwrap().expose(), b"s3cret");
    }

    #[test]
    fn client_ok_without_secret_for_update() {
        let mut codec = ClientCodec::default();
        codec
            .encode(
                Request::Update {
                    location: "a".into(),
                    secret: passphrase("x"),
                },
                &mut BytesMut::new(),
            )
            .unwrap();
        let mut buf = BytesMut::from(&[0u8][..]);
        let response = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.status, Status::Ok);
        assert!(response.secret.is_none());
    }

    #[test]
    fn client_never_truncates_oversize_secret() {
        let mut codec = ClientCodec::default();
        codec
            .encode(Request::Read { location: "a".into() }, &mut BytesMut::new())
            .unwrap();
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u32(MAX_PASSPHRASE_LEN as u32 + 1);
        buf.put_slice(&vec![b'a'; MAX_PASSPHRASE_LEN + 1]);
        assert!(matches!(codec.decode(&mut buf), Err(SecretError::TooLarge)));
    }

    #[test]
    fn client_rejects_line_break_in_secret() {
        let mut codec = ClientCodec::default();
        codec
            .encode(Request::Read { location: "a".into() }, &mut BytesMut::new())
            .unwrap();
        let mut buf = BytesMut::from(&b"\x00\x00\x00\x00\x03a\nb"[..]);
        assert!(matches!(codec.decode(&mut buf), Err(SecretError::ForbiddenByte)));
    }

    #[test]
    fn failure_statuses_carry_no_payload() {
        let mut codec = ClientCodec::default();
        codec
            .encode(Request::Read { location: "a".into() }, &mut BytesMut::new())
            .unwrap();
        let mut buf = BytesMut::from(&[Status::NotConfigured as u8][..]);
        let response = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(response.status, Status::NotConfigured);
        assert!(buf.is_empty());

        let mut bad = BytesMut::from(&[42u8][..]);
        assert!(matches!(codec.decode(&mut bad), Err(SecretError::Protocol(_))));
    }

    #[tokio::test]
    async fn framed_exchange_over_scripted_stream() {
        use futures::{SinkExt, StreamExt};
        use tokio_util::codec::Framed;

        let mut request = BytesMut::new();
        ClientCodec::default()
            .encode(Request::Read { location: "db".into() }, &mut request)
            .unwrap();
        let stream = tokio_test::io::Builder::new()
            .write(&request)
            .read(b"\x00\x00\x00\x00\x02pw")
            .build();

        let mut framed = Framed::new(stream, ClientCodec::default());
        framed.send(Request::Read { location: "db".into() }).await.unwrap();
        let response = framed.next().await.unwrap().unwrap();
        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.secret.unwrap().expose(), b"pw");
    }
}
