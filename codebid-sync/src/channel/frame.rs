use serde::de::DeserializeOwned;
use thiserror::Error;

use codebid_core::SequencedEvent;
use codebid_types::{EventFrame, ServerEvent};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid json: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("unknown event {0:?}")]
    UnknownEvent(String),
    #[error("bad payload for {event}: {source}")]
    BadPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

fn payload<T: DeserializeOwned>(frame: &EventFrame) -> Result<T, FrameError> {
    serde_json::from_value(frame.data.clone()).map_err(|source| FrameError::BadPayload {
        event: frame.event.clone(),
        source,
    })
}

/// Decodes one text frame of the push channel.
pub fn decode_frame(text: &str) -> Result<SequencedEvent, FrameError> {
    let frame: EventFrame = serde_json::from_str(text).map_err(FrameError::NotJson)?;

    let event = match frame.event.as_str() {
        ServerEvent::ROUND_STARTED => ServerEvent::RoundStarted(payload(&frame)?),
        ServerEvent::TIMER_UPDATE => ServerEvent::TimerUpdate(payload(&frame)?),
        ServerEvent::BID_RECEIVED => ServerEvent::BidReceived(payload(&frame)?),
        ServerEvent::BIDDING_ENDED => {
            if frame.data.is_null() {
                ServerEvent::BiddingEnded(Default::default())
            } else {
                ServerEvent::BiddingEnded(payload(&frame)?)
            }
        }
        ServerEvent::ROUND_COMPLETED => ServerEvent::RoundCompleted(payload(&frame)?),
        ServerEvent::ROUND_FORCE_RESET => ServerEvent::RoundForceReset,
        ServerEvent::GAME_RESET => ServerEvent::GameReset,
        ServerEvent::TEAMS_ONLINE => ServerEvent::TeamsOnline(payload(&frame)?),
        ServerEvent::ROUND_STATUS => ServerEvent::RoundStatus(payload(&frame)?),
        ServerEvent::FORCE_LOGOUT => {
            if frame.data.is_null() {
                ServerEvent::ForceLogout(Default::default())
            } else {
                ServerEvent::ForceLogout(payload(&frame)?)
            }
        }
        other => return Err(FrameError::UnknownEvent(other.to_string())),
    };

    Ok(SequencedEvent {
        event,
        seq: frame.seq,
    })
}
