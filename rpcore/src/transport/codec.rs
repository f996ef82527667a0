//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Message codecs.
//!
//! The runtime treats the wire format as opaque: a [`Codec`] appends an
//! encoded message to a buffer and takes one complete message off the front
//! of a buffer, or reports that more bytes are needed.
//!
//! [`JsonFrameCodec`] is the bundled format. Each message is prefixed with a
//! 4-byte big-endian length:
//!
//! ```text
//! +------------------+-------------------+
//! | Length (4 bytes) | Payload (N bytes) |
//! +------------------+-------------------+
//! ```

use crate::transport::TransportError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Maximum payload size of one frame (16 MiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the length prefix.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Result of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A complete message was removed from the buffer.
    Item(T),
    /// The buffer does not hold a complete message yet.
    NeedMoreData,
}

/// Encodes and decodes messages of type `T`.
pub trait Codec<T>: Send + Sync + 'static {
    /// Appends `item` to `dst`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Codec`] if the message cannot be encoded.
    fn encode(&self, item: &T, dst: &mut Vec<u8>) -> Result<(), TransportError>;

    /// Removes one message from the front of `src`.
    ///
    /// # Errors
    ///
    /// [`TransportError::Codec`] if the buffer holds a malformed message. The
    /// stream cannot be resynchronized after that.
    fn decode(&self, src: &mut Vec<u8>) -> Result<Decoded<T>, TransportError>;
}

/// Length-prefixed `serde_json` frames.
///
/// # Examples
///
/// ```rust
/// use rpcore::invoke::Request;
/// use rpcore::transport::{Codec, Decoded, JsonFrameCodec};
///
/// let codec = JsonFrameCodec;
/// let mut buffer = Vec::new();
/// codec.encode(&Request::new("greeter", "hello", b"hi".to_vec()), &mut buffer).unwrap();
///
/// let mut partial = buffer[..3].to_vec();
/// assert_eq!(Codec::<Request>::decode(&codec, &mut partial).unwrap(), Decoded::NeedMoreData);
///
/// match Codec::<Request>::decode(&codec, &mut buffer).unwrap() {
///     Decoded::Item(request) => assert_eq!(request.method, "hello"),
///     Decoded::NeedMoreData => unreachable!(),
/// }
/// assert!(buffer.is_empty());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrameCodec;

impl<T> Codec<T> for JsonFrameCodec
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn encode(&self, item: &T, dst: &mut Vec<u8>) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(item).map_err(|e| TransportError::Codec {
            reason: format!("failed to encode frame: {}", e),
        })?;
        if payload.len() > MAX_FRAME_SIZE as usize {
            return Err(TransportError::Codec {
                reason: format!(
                    "frame size {} exceeds maximum allowed size {}",
                    payload.len(),
                    MAX_FRAME_SIZE
                ),
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + payload.len());
        dst.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        dst.extend_from_slice(&payload);
        Ok(())
    }

    fn decode(&self, src: &mut Vec<u8>) -> Result<Decoded<T>, TransportError> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(Decoded::NeedMoreData);
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&src[..FRAME_HEADER_SIZE]);
        let len = u32::from_be_bytes(header);
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::Codec {
                reason: format!(
                    "frame size {} exceeds maximum allowed size {}",
                    len, MAX_FRAME_SIZE
                ),
            });
        }

        let end = FRAME_HEADER_SIZE + len as usize;
        if src.len() < end {
            return Ok(Decoded::NeedMoreData);
        }

        let item = serde_json::from_slice(&src[FRAME_HEADER_SIZE..end]).map_err(|e| {
            TransportError::Codec {
                reason: format!("failed to decode frame: {}", e),
            }
        })?;
        src.drain(..end);
        Ok(Decoded::Item(item))
    }
}
