use crate::api::{RobotClient, RobotCommand, RobotMode};
use crate::session::SessionState;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HoldControl {
    Forward,
    Backward,
    Left,
    Right,
}

impl HoldControl {
    pub const ALL: [Self; 4] = [Self::Forward, Self::Backward, Self::Left, Self::Right];

    #[must_use]
    pub fn command(self) -> RobotCommand {
        match self {
            Self::Forward => RobotCommand::Forward,
            Self::Backward => RobotCommand::Backward,
            Self::Left => RobotCommand::Left,
            Self::Right => RobotCommand::Right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapControl {
    Stop,
    Horn,
}

impl TapControl {
    #[must_use]
    pub fn command(self) -> RobotCommand {
        match self {
            Self::Stop => RobotCommand::Stop,
            Self::Horn => RobotCommand::Horn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outbound {
    Command(RobotCommand),
    Mode(RobotMode),
}

pub struct InputMapper {
    api: Arc<RobotClient>,
    session: Arc<SessionState>,
    active: HashSet<HoldControl>,
    // Send task of each active hold; the matching stop chains on it.
    in_flight: HashMap<HoldControl, JoinHandle<()>>,
    // Stop tasks that have not finished yet, so a quit right after a release
    // can still wait for the stop to reach the wire.
    settling: Vec<JoinHandle<()>>,
    active_mode: RobotMode,
}

impl InputMapper {
    #[must_use]
    pub fn new(api: Arc<RobotClient>, session: Arc<SessionState>) -> Self {
        Self::with_mode(api, session, RobotMode::Free)
    }

    // Used when the client is rebuilt for new addresses; the mode selection
    // survives without being re-announced.
    #[must_use]
    pub fn with_mode(api: Arc<RobotClient>, session: Arc<SessionState>, mode: RobotMode) -> Self {
        Self {
            api,
            session,
            active: HashSet::new(),
            in_flight: HashMap::new(),
            settling: Vec::new(),
            active_mode: mode,
        }
    }

    pub fn press(&mut self, control: HoldControl) {
        if let Some(call) = self.on_press(control) {
            let sent = self.dispatch(call, None);
            self.in_flight.insert(control, sent);
        }
    }

    pub fn release(&mut self, control: HoldControl) {
        if let Some(call) = self.on_release(control) {
            let after = self.in_flight.remove(&control);
            let stop = self.dispatch(call, after);
            self.track_settling(stop);
        }
    }

    // One stop per active control, for focus loss and screen exits.
    pub fn cancel_all(&mut self) {
        let released: Vec<HoldControl> = self.active.drain().collect();
        for control in released {
            let after = self.in_flight.remove(&control);
            let stop = self.dispatch(Outbound::Command(RobotCommand::Stop), after);
            self.track_settling(stop);
        }
    }

    pub fn tap(&self, control: TapControl) {
        self.dispatch(Outbound::Command(control.command()), None);
    }

    // The new mode sticks even if the send fails; the command-error flag
    // carries the failure.
    pub fn select_mode(&mut self, mode: RobotMode) {
        self.active_mode = mode;
        self.dispatch(Outbound::Mode(mode), None);
    }

    // Unfinished hold sends and their stops, handed over for a final bounded
    // wait before the process exits.
    pub fn take_pending_sends(&mut self) -> Vec<JoinHandle<()>> {
        self.in_flight
            .drain()
            .map(|(_, handle)| handle)
            .chain(self.settling.drain(..))
            .collect()
    }

    fn track_settling(&mut self, handle: JoinHandle<()>) {
        self.settling.retain(|settled| !settled.is_finished());
        self.settling.push(handle);
    }

    #[must_use]
    pub fn active_mode(&self) -> RobotMode {
        self.active_mode
    }

    #[must_use]
    pub fn is_active(&self, control: HoldControl) -> bool {
        self.active.contains(&control)
    }

    // Key autorepeat and re-entrant starts collapse into the initial press.
    fn on_press(&mut self, control: HoldControl) -> Option<Outbound> {
        self.active
            .insert(control)
            .then(|| Outbound::Command(control.command()))
    }

    // A release without a prior press sends nothing.
    fn on_release(&mut self, control: HoldControl) -> Option<Outbound> {
        self.active
            .remove(&control)
            .then(|| Outbound::Command(RobotCommand::Stop))
    }

    // A gesture's stop must not pass its directional command on the wire, so
    // the stop task awaits the press task before sending. Sends for other
    // controls, taps and mode changes stay concurrent.
    fn dispatch(&self, call: Outbound, after: Option<JoinHandle<()>>) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            if let Some(handle) = after {
                let _ = handle.await;
            }
            let result = match call {
                Outbound::Command(command) => api.send_command(command).await,
                Outbound::Mode(mode) => api.set_mode(mode).await,
            };
            match result {
                Ok(()) => session.record_command_success(),
                Err(err) => session.record_command_failure(&err),
            }
        })
    }
}
