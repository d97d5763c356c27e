//! Room task: owns the [`Room`] and both round cadences

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::session::{SessionId, SessionRegistry};
use crate::util::time::{COUNTDOWN_PERIOD, TICK_PERIOD};

use super::{Broadcaster, Frame, Room, RoomError, RoomPhase, RoomSettings};

const COMMAND_BUFFER: usize = 256;

/// Requests from connections to the room task
#[derive(Debug)]
pub enum RoomCommand {
    Join {
        session: SessionId,
        username: String,
        reply: oneshot::Sender<Result<String, RoomError>>,
    },
    Leave {
        session: SessionId,
    },
    Disconnect {
        session: SessionId,
    },
    StartRound {
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    StopRound,
    Status {
        reply: oneshot::Sender<RoomStatus>,
    },
}

/// Point-in-time view for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub phase: RoomPhase,
    pub participants: usize,
    pub seconds_remaining: Option<u32>,
}

/// Cloneable handle used by connections and routes
#[derive(Clone)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
    feed: Broadcaster,
}

impl RoomHandle {
    pub async fn join(&self, session: SessionId, username: String) -> Result<String, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            session,
            username,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RoomError::Unavailable)?
    }

    pub async fn leave(&self, session: SessionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave { session }).await
    }

    pub async fn disconnect(&self, session: SessionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnect { session }).await
    }

    pub async fn start_round(&self) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::StartRound { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable)?
    }

    pub async fn stop_round(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::StopRound).await
    }

    pub async fn status(&self) -> Result<RoomStatus, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Status { reply }).await?;
        rx.await.map_err(|_| RoomError::Unavailable)
    }

    /// Receive room broadcasts from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Frame> {
        self.feed.subscribe()
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.tx.send(cmd).await.map_err(|_| RoomError::Unavailable)
    }
}

/// The room task. Commands, ticks and countdown seconds are handled one at a
/// time, so a step never sees a half-applied roster change or teardown.
pub struct RoomActor {
    room: Room,
    cmd_rx: mpsc::Receiver<RoomCommand>,
    stepper: Option<Interval>,
    countdown: Option<Interval>,
}

impl RoomActor {
    pub fn new(settings: RoomSettings, registry: Arc<SessionRegistry>) -> (Self, RoomHandle) {
        let (tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let feed = Broadcaster::default();
        let handle = RoomHandle {
            tx,
            feed: feed.clone(),
        };
        let actor = Self {
            room: Room::new(registry, feed, settings),
            cmd_rx,
            stepper: None,
            countdown: None,
        };
        (actor, handle)
    }

    pub async fn run(mut self) {
        info!("Room task started");

        loop {
            tokio::select! {
                biased;

                _ = next_tick(&mut self.countdown) => {
                    if let Some(remaining) = self.room.countdown_tick() {
                        debug!(remaining, "Countdown");
                    }
                }
                _ = next_tick(&mut self.stepper) => {
                    self.room.tick();
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
            }
        }

        self.disarm();
        self.room.stop_round();
        info!("Room task stopped");
    }

    fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                session,
                username,
                reply,
            } => {
                let _ = reply.send(self.room.join(session, &username));
            }
            RoomCommand::Leave { session } => {
                self.room.leave(session);
            }
            RoomCommand::Disconnect { session } => {
                self.room.disconnect(session);
            }
            RoomCommand::StartRound { reply } => {
                let result = self.room.start_round();
                match &result {
                    Ok(()) => self.arm(),
                    Err(e) => warn!(error = %e, "Round start rejected"),
                }
                let _ = reply.send(result);
            }
            RoomCommand::StopRound => {
                // Cadences go first so no step can follow the teardown
                self.disarm();
                self.room.stop_round();
            }
            RoomCommand::Status { reply } => {
                let _ = reply.send(RoomStatus {
                    phase: self.room.phase(),
                    participants: self.room.participants().len(),
                    seconds_remaining: self.room.remaining_secs(),
                });
            }
        }
    }

    fn arm(&mut self) {
        self.stepper = Some(cadence(TICK_PERIOD));
        self.countdown = Some(cadence(COUNTDOWN_PERIOD));
    }

    fn disarm(&mut self) {
        self.stepper = None;
        self.countdown = None;
    }
}

/// Recurring timer whose first tick is one period away. A slow tick delays
/// the next one instead of bursting to catch up.
fn cadence(period: std::time::Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Waits for the timer if armed, otherwise never completes
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
