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

//! Transport layer.
//!
//! The runtime core only depends on the traits in this module:
//!
//! - [`Connector`] / [`Connection`]: dial a destination and carry
//!   request/response exchanges over it
//! - [`ServerTransport`] / [`Dispatcher`]: accept inbound requests and hand
//!   them to the provider side
//! - [`Codec`]: the wire format, opaque to everything above it
//!
//! [`TcpConnector`] and [`TcpServerTransport`] are the bundled
//! implementations, multiplexing concurrent calls over one stream by request
//! id ([`RequestIdGenerator`], [`PendingRequests`]).
//!
//! # Examples
//!
//! ```rust,no_run
//! use rpcore::invoke::Request;
//! use rpcore::transport::{Connection, Connector, RemoteAddress, TcpConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let address: RemoteAddress = "tcp://127.0.0.1:8000".parse()?;
//! let connection = TcpConnector::new().connect(&address).await?;
//! let response = connection.call(Request::new("greeter", "hello", b"hi".to_vec())).await?;
//! println!("status {}", response.framework_code);
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

mod address;
mod codec;
mod correlation;
mod error;
mod pending;
mod tcp;
mod traits;

pub use address::{Network, RemoteAddress};
pub use codec::{Codec, Decoded, JsonFrameCodec, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use correlation::RequestIdGenerator;
pub use error::TransportError;
pub use pending::PendingRequests;
pub use tcp::{TcpConnection, TcpConnector, TcpServerTransport};
pub use traits::{Connection, Connector, Dispatcher, ServerTransport};
