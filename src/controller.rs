use std::{
    collections::VecDeque,
    sync::{
        Arc, RwLock,
        mpsc::{self, Receiver, RecvTimeoutError, Sender},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crate::{
    assets::ArtworkLoader,
    control::{ControlHandle, DisplayStatus},
    display::{DisplayInput, DisplayMachine, DisplayState, InputPacer},
    foundation::{core::PixelGrid, error::CoverError, error::CoverResult},
    resolve::{CoverEvent, CoverIdentity, CoverResolver, EntitySnapshot},
    schedule::{DelayedTask, earliest},
    settings::ChangeSet,
};

const CLOCK_TICK: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum Command {
    /// A full entity snapshot from the event source.
    Snapshot(EntitySnapshot),
    /// The settings record was updated; the new values are already in the store.
    SettingsChanged(ChangeSet),
    Refresh,
    CoverReady {
        identity: CoverIdentity,
        grid: Arc<PixelGrid>,
    },
    CoverFailed {
        identity: CoverIdentity,
        error: String,
    },
    Shutdown,
}

/// Running controller: a handle for the outside world plus the thread to join.
pub struct ControllerThread {
    handle: ControlHandle,
    thread: JoinHandle<()>,
}

impl ControllerThread {
    pub fn handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn join(self) -> CoverResult<()> {
        self.thread
            .join()
            .map_err(|_| CoverError::Other(anyhow::anyhow!("controller thread panicked")))
    }
}

pub struct Controller {
    inbox: Receiver<Command>,
    outbox: Sender<Command>,
    resolver: CoverResolver,
    display: DisplayMachine,
    loader: ArtworkLoader,
    status: Arc<RwLock<DisplayStatus>>,
    clock_tick: DelayedTask,
    deferred: VecDeque<Command>,
}

impl Controller {
    /// Start the controller thread. The display is blanked (or shows the clock) immediately.
    pub fn spawn(
        display: DisplayMachine,
        loader: ArtworkLoader,
        resolver: CoverResolver,
    ) -> CoverResult<ControllerThread> {
        let (tx, rx) = mpsc::channel();
        let status = Arc::new(RwLock::new(DisplayStatus::default()));
        let handle = ControlHandle::new(tx.clone(), Arc::clone(&status), display.settings().clone());

        let mut controller = Controller {
            inbox: rx,
            outbox: tx,
            resolver,
            display,
            loader,
            status,
            clock_tick: DelayedTask::new(CLOCK_TICK),
            deferred: VecDeque::new(),
        };
        let thread = std::thread::Builder::new()
            .name("controller".to_string())
            .spawn(move || controller.run())?;
        Ok(ControllerThread { handle, thread })
    }

    fn run(&mut self) {
        tracing::info!(entities = ?self.resolver.priority(), "controller started");
        self.display.start();
        self.sync_clock_tick(Instant::now());
        self.publish();

        loop {
            let cmd = match self.deferred.pop_front() {
                Some(cmd) => Some(cmd),
                None => match self.next_deadline() {
                    Some(deadline) => {
                        let timeout = deadline.saturating_duration_since(Instant::now());
                        match self.inbox.recv_timeout(timeout) {
                            Ok(cmd) => Some(cmd),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match self.inbox.recv() {
                        Ok(cmd) => Some(cmd),
                        Err(_) => break,
                    },
                },
            };

            if let Some(cmd) = cmd {
                if !self.on_command(cmd) {
                    break;
                }
            }
            let now = Instant::now();
            self.poll_timers(now);
            self.sync_clock_tick(now);
            self.publish();
        }

        self.display.shutdown();
        self.publish();
        tracing::info!("controller stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([self.resolver.next_deadline(), self.clock_tick.deadline()])
    }

    /// Returns `false` once the loop should stop.
    fn on_command(&mut self, cmd: Command) -> bool {
        let now = Instant::now();
        match cmd {
            Command::Snapshot(snapshot) => self.resolver.submit(snapshot, now),
            Command::SettingsChanged(changes) => {
                self.drive(DisplayInput::SettingsChanged(changes));
            }
            Command::Refresh => {
                tracing::info!("refresh requested");
                self.resolver.refresh(now);
            }
            Command::CoverReady { identity, grid } => {
                if self.resolver.is_current(&identity) {
                    self.drive(DisplayInput::Cover { identity, grid });
                } else {
                    tracing::debug!(url = %identity.url, "dropping stale cover");
                }
            }
            Command::CoverFailed { identity, error } => {
                tracing::warn!(url = %identity.url, entity = %identity.entity, %error, "could not load cover, keeping current display");
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn poll_timers(&mut self, now: Instant) {
        while let Some(event) = self.resolver.poll(now) {
            match event {
                CoverEvent::Changed(identity) => self.spawn_fetch(identity),
                CoverEvent::NothingPlaying => self.drive(DisplayInput::NothingPlaying),
            }
        }
        if self.clock_tick.poll(now) {
            self.display.tick_clock();
        }
    }

    fn sync_clock_tick(&mut self, now: Instant) {
        if !self.display.clock_visible() {
            self.clock_tick.cancel();
        } else if !self.clock_tick.is_scheduled() {
            self.clock_tick.schedule(now);
        }
    }

    /// Hand `input` to the display, pacing frames off the inbox.
    fn drive(&mut self, input: DisplayInput) {
        let mut pacer = InboxPacer {
            inbox: &self.inbox,
            resolver: &self.resolver,
            deferred: &mut self.deferred,
            status: &self.status,
            marked: false,
        };
        self.display.handle(input, &mut pacer);
    }

    fn spawn_fetch(&self, identity: CoverIdentity) {
        let loader = self.loader.clone();
        let outbox = self.outbox.clone();
        let spawned = std::thread::Builder::new()
            .name("fetch".to_string())
            .spawn(move || {
                let cmd = match loader.load(&identity.url) {
                    Ok(grid) => Command::CoverReady {
                        identity,
                        grid: Arc::new(grid),
                    },
                    Err(e) => Command::CoverFailed {
                        identity,
                        error: e.to_string(),
                    },
                };
                let _ = outbox.send(cmd);
            });
        if let Err(e) = spawned {
            tracing::error!(error = %e, "could not start fetch worker");
        }
    }

    fn publish(&self) {
        let (version, settings) = self.display.settings().snapshot();
        let active = self.resolver.active();
        let cover = self.display.current_cover();
        let next = DisplayStatus {
            state: self.display.state(),
            current_cover: cover.map(|c| c.url.clone()),
            current_entity: cover.map(|c| c.entity.clone()),
            is_playing: active.is_some(),
            clock_visible: self.display.clock_visible(),
            preview: self.display.is_preview(),
            ambient: self.display.ambient_pair(),
            settings,
            settings_version: version,
            entities: self.resolver.priority().to_vec(),
            ambient_devices: self.display.ambient_devices(),
        };
        *self.status.write().unwrap_or_else(|p| p.into_inner()) = next;
    }
}

/// Frame pacing that keeps the inbox moving.
///
/// Covers that are still current and settings changes go straight back to the display; every
/// other command waits in `deferred` until the transition is over.
struct InboxPacer<'a> {
    inbox: &'a Receiver<Command>,
    resolver: &'a CoverResolver,
    deferred: &'a mut VecDeque<Command>,
    status: &'a RwLock<DisplayStatus>,
    marked: bool,
}

impl InputPacer for InboxPacer<'_> {
    fn wait(&mut self, delay: Duration) -> Vec<DisplayInput> {
        if !self.marked {
            self.marked = true;
            self.status.write().unwrap_or_else(|p| p.into_inner()).state =
                DisplayState::Transitioning;
        }

        let deadline = Instant::now() + delay;
        let mut inputs = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.inbox.recv_timeout(remaining) {
                Ok(Command::CoverReady { identity, grid }) if self.resolver.is_current(&identity) => {
                    inputs.push(DisplayInput::Cover { identity, grid });
                }
                Ok(Command::SettingsChanged(changes)) => {
                    inputs.push(DisplayInput::SettingsChanged(changes));
                }
                Ok(other) => self.deferred.push_back(other),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    std::thread::sleep(remaining);
                    break;
                }
            }
        }
        inputs
    }
}
