//! Heart-beat negotiation.
//!
//! Both sides advertise `heart-beat:<outgoing>,<incoming>` in
//! milliseconds. The effective interval in each direction is the larger
//! of the two offers, or disabled when either side offers zero.

use std::time::Duration;

/// Client heart-beat offer in both directions.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(4000);

/// Multiplier applied to the incoming interval before the connection is
/// considered dead.
const RECEIVE_GRACE_FACTOR: u32 = 2;

/// One side's `heart-beat` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartBeat {
    /// How often this side can send heart-beats (zero = never).
    pub outgoing: Duration,
    /// How often this side wants to receive heart-beats (zero = never).
    pub incoming: Duration,
}

impl HeartBeat {
    pub const DISABLED: HeartBeat = HeartBeat {
        outgoing: Duration::ZERO,
        incoming: Duration::ZERO,
    };

    pub const fn client_default() -> Self {
        Self {
            outgoing: HEARTBEAT_INTERVAL,
            incoming: HEARTBEAT_INTERVAL,
        }
    }

    pub fn header_value(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Parse a `heart-beat` header value. Returns `None` when malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let (out, inc) = value.split_once(',')?;
        let outgoing = out.trim().parse::<u64>().ok()?;
        let incoming = inc.trim().parse::<u64>().ok()?;
        Some(Self {
            outgoing: Duration::from_millis(outgoing),
            incoming: Duration::from_millis(incoming),
        })
    }
}

/// Effective heart-beat schedule for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPlan {
    /// Interval at which the client sends EOL heart-beats.
    pub send_every: Option<Duration>,
    /// Interval at which the broker promised to send something.
    pub expect_every: Option<Duration>,
}

impl HeartbeatPlan {
    /// Silence longer than this means the connection is gone.
    pub fn receive_deadline(&self) -> Option<Duration> {
        self.expect_every.map(|d| d * RECEIVE_GRACE_FACTOR)
    }
}

/// Schedule between CONNECT and CONNECTED: nothing is sent, and the
/// broker must answer within the deadline implied by the client's own
/// offer (or the default interval when the offer disables it).
pub fn handshake_plan(offer: HeartBeat) -> HeartbeatPlan {
    let expect = if offer.incoming.is_zero() {
        HEARTBEAT_INTERVAL
    } else {
        offer.incoming
    };
    HeartbeatPlan {
        send_every: None,
        expect_every: Some(expect),
    }
}

/// Combine the client offer with the broker's CONNECTED header.
pub fn negotiate(client: HeartBeat, server: HeartBeat) -> HeartbeatPlan {
    HeartbeatPlan {
        send_every: pick(client.outgoing, server.incoming),
        expect_every: pick(client.incoming, server.outgoing),
    }
}

fn pick(ours: Duration, theirs: Duration) -> Option<Duration> {
    if ours.is_zero() || theirs.is_zero() {
        None
    } else {
        Some(ours.max(theirs))
    }
}
