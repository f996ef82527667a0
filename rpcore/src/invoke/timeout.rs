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

//! Call budgets.
//!
//! A [`LinkInvokeTimeout`] is the end-to-end deadline a call chain hands to
//! each hop. It is captured when an inbound request arrives and shrinks as the
//! hop runs. Before every outbound call the orchestrator computes a
//! [`LeftTimeout`]: the smaller of the locally configured timeout and what is
//! left of the link deadline. That value bounds the call and travels
//! downstream as the next hop's link deadline.

use crate::error::TimeoutKind;
use std::time::Duration;
use tokio::time::Instant;

/// End-to-end deadline inherited from an upstream caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkInvokeTimeout {
    start: Instant,
    timeout: Duration,
}

impl LinkInvokeTimeout {
    /// Starts a link budget of `timeout` now.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::starting_at(Instant::now(), timeout)
    }

    /// Starts a link budget of `timeout` at `start`.
    #[must_use]
    pub fn starting_at(start: Instant, timeout: Duration) -> Self {
        Self { start, timeout }
    }

    /// When the budget was captured.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// The budget as received.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute deadline.
    pub fn deadline(&self) -> Instant {
        self.start + self.timeout
    }

    /// Budget left now, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Budget for one outbound call, recomputed at every hop.
///
/// # Examples
///
/// ```rust
/// use rpcore::error::TimeoutKind;
/// use rpcore::invoke::{LeftTimeout, LinkInvokeTimeout};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let local = Duration::from_millis(500);
///
/// let left = LeftTimeout::compute(local, None);
/// assert_eq!(left.timeout(), local);
/// assert_eq!(left.kind(), TimeoutKind::Invoke);
///
/// let link = LinkInvokeTimeout::new(Duration::from_millis(200));
/// let left = LeftTimeout::compute(local, Some(&link));
/// assert!(left.timeout() <= Duration::from_millis(200));
/// assert_eq!(left.kind(), TimeoutKind::Link);
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeftTimeout {
    timeout: Duration,
    kind: TimeoutKind,
}

impl LeftTimeout {
    /// The tighter of `local` and whatever is left of `link`.
    ///
    /// Ties go to the local timeout.
    #[must_use]
    pub fn compute(local: Duration, link: Option<&LinkInvokeTimeout>) -> Self {
        match link.map(LinkInvokeTimeout::remaining) {
            Some(remaining) if remaining < local => Self {
                timeout: remaining,
                kind: TimeoutKind::Link,
            },
            _ => Self {
                timeout: local,
                kind: TimeoutKind::Invoke,
            },
        }
    }

    /// The budget for this call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Which deadline the budget came from.
    pub fn kind(&self) -> TimeoutKind {
        self.kind
    }

    /// Returns `true` if there is no budget left at all.
    pub fn is_expired(&self) -> bool {
        self.timeout.is_zero()
    }
}
