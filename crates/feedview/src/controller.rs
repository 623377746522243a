mod message;

use std::pin::Pin;
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, Duration, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::error::{Error, Result};
use crate::health::HealthProbe;
use crate::session::{Command, StreamSession};
use crate::status::StatusReport;
use crate::surface::{DisplaySurface, SurfaceEvent, SurfaceEvents};

use message::{ControllerMessage, ProbeResult};

/// Handle to a running stream controller.
///
/// The controller task lives until [`ControllerRef::shutdown`] is called or every
/// handle has been dropped; either way the surface is cleared on the way out.
#[derive(Clone)]
pub struct ControllerRef {
    sender: mpsc::Sender<ControllerMessage>,
    status: watch::Receiver<StatusReport>,
}

impl ControllerRef {
    pub fn new<P, D>(config: &ViewerConfig, probe: P, surface: D) -> Result<Self>
    where
        P: HealthProbe,
        D: DisplaySurface,
    {
        let session = StreamSession::from_config(config)?;
        let (sender, mailbox) = mpsc::channel::<ControllerMessage>(10);
        let (status_sender, status) = watch::channel(session.report());
        let actor = Controller::new(mailbox, config, session, probe, surface, status_sender);
        tokio::spawn(run_controller(actor));

        Ok(Self { sender, status })
    }

    pub async fn start(&self) -> Result<()> {
        self.send(ControllerMessage::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(ControllerMessage::Stop).await
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let (sender, receiver) = oneshot::channel();
        self.send(ControllerMessage::Status(sender)).await?;
        receiver.await.map_err(|_| Error::ControllerClosed)
    }

    /// Every status change, latest value first.
    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.status.clone()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(ControllerMessage::Shutdown).await
    }

    async fn send(&self, message: ControllerMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| Error::ControllerClosed)
    }
}

struct Controller<P, D> {
    mailbox: mpsc::Receiver<ControllerMessage>,
    session: StreamSession,
    probe: Arc<P>,
    surface: D,
    status: watch::Sender<StatusReport>,
    probe_sender: mpsc::UnboundedSender<ProbeResult>,
    probe_results: mpsc::UnboundedReceiver<ProbeResult>,
    surface_sender: mpsc::UnboundedSender<SurfaceEvent>,
    surface_events: mpsc::UnboundedReceiver<SurfaceEvent>,
    reconnect_timer: Pin<Box<Sleep>>,
    reconnect_armed: bool,
    readiness_timer: Pin<Box<Sleep>>,
    readiness_attempt: Option<u64>,
    monitor: Interval,
}

impl<P: HealthProbe, D: DisplaySurface> Controller<P, D> {
    fn new(
        mailbox: mpsc::Receiver<ControllerMessage>,
        config: &ViewerConfig,
        session: StreamSession,
        probe: P,
        surface: D,
        status: watch::Sender<StatusReport>,
    ) -> Self {
        let (probe_sender, probe_results) = mpsc::unbounded_channel();
        let (surface_sender, surface_events) = mpsc::unbounded_channel();
        let mut monitor = interval(config.health_check_interval());
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            mailbox,
            session,
            probe: Arc::new(probe),
            surface,
            status,
            probe_sender,
            probe_results,
            surface_sender,
            surface_events,
            reconnect_timer: Box::pin(sleep(Duration::ZERO)),
            reconnect_armed: false,
            readiness_timer: Box::pin(sleep(Duration::ZERO)),
            readiness_attempt: None,
            monitor,
        }
    }

    async fn handle(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Start => {
                let commands = self.session.start();
                self.execute(commands).await;
            }
            ControllerMessage::Stop => {
                let commands = self.session.stop();
                self.execute(commands).await;
            }
            ControllerMessage::Status(responder) => {
                if responder.send(self.session.report()).is_err() {
                    debug!("status requester went away");
                }
            }
            ControllerMessage::Shutdown => {}
        }
    }

    async fn on_probe_result(&mut self, result: ProbeResult) {
        let commands = self.session.on_probe_result(result.ticket, result.healthy);
        self.execute(commands).await;
    }

    async fn on_surface_event(&mut self, event: SurfaceEvent) {
        let commands = match event {
            SurfaceEvent::Loaded { attempt } => self.session.on_surface_loaded(attempt),
            SurfaceEvent::Failed { attempt, reason } => {
                warn!(attempt, %reason, "stream failed to load");
                self.session.on_surface_failed(attempt)
            }
        };
        self.execute(commands).await;
    }

    async fn on_reconnect_due(&mut self) {
        self.reconnect_armed = false;
        let commands = self.session.on_reconnect_due();
        self.execute(commands).await;
    }

    async fn on_readiness_due(&mut self) {
        let Some(attempt) = self.readiness_attempt.take() else {
            return;
        };
        let dimensions = self.surface.rendered_dimensions();
        debug!(attempt, ?dimensions, "checking rendered dimensions");
        let commands = self.session.on_readiness_polled(attempt, dimensions);
        self.execute(commands).await;
    }

    async fn on_monitor_tick(&mut self) {
        let commands = self.session.begin_monitor_probe();
        self.execute(commands).await;
    }

    async fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::ProbeHealth { ticket } => self.spawn_probe(ticket),
                Command::Bind { attempt, url } => {
                    info!(attempt, %url, "binding stream");
                    let events = SurfaceEvents::new(attempt, self.surface_sender.clone());
                    self.surface.bind(url, events).await;
                }
                Command::ClearSurface => {
                    self.readiness_attempt = None;
                    self.surface.clear().await;
                }
                Command::ScheduleReconnect { delay } => {
                    self.reconnect_timer.as_mut().reset(Instant::now() + delay);
                    self.reconnect_armed = true;
                }
                Command::CancelReconnect => {
                    if self.reconnect_armed {
                        debug!("cancelling pending reconnect");
                    }
                    self.reconnect_armed = false;
                }
                Command::ScheduleReadinessCheck { attempt, delay } => {
                    self.readiness_timer.as_mut().reset(Instant::now() + delay);
                    self.readiness_attempt = Some(attempt);
                }
            }
        }
    }

    fn spawn_probe(&self, ticket: u64) {
        let probe = Arc::clone(&self.probe);
        let results = self.probe_sender.clone();

        tokio::spawn(async move {
            let healthy = match probe.probe().await {
                Ok(_) => true,
                Err(err) => {
                    warn!(ticket, %err, "health check failed");
                    false
                }
            };
            if results.send(ProbeResult { ticket, healthy }).is_err() {
                debug!(ticket, "controller is gone, dropping probe result");
            }
        });
    }

    fn publish_status(&self) {
        let report = self.session.report();
        self.status.send_if_modified(|current| {
            if *current == report {
                return false;
            }
            debug!(state = %report.state, text = %report.text, "status changed");
            *current = report.clone();
            true
        });
    }
}

async fn run_controller<P, D>(mut actor: Controller<P, D>)
where
    P: HealthProbe,
    D: DisplaySurface,
{
    loop {
        let next_message = actor.mailbox.recv();

        select! {
            next = next_message => {
                match next {
                    Some(ControllerMessage::Shutdown) | None => break,
                    Some(msg) => {
                        actor.handle(msg).await
                    }
                }
            }
            Some(result) = actor.probe_results.recv() => {
                actor.on_probe_result(result).await
            }
            Some(event) = actor.surface_events.recv() => {
                actor.on_surface_event(event).await
            }
            () = actor.reconnect_timer.as_mut(), if actor.reconnect_armed => {
                actor.on_reconnect_due().await
            }
            () = actor.readiness_timer.as_mut(), if actor.readiness_attempt.is_some() => {
                actor.on_readiness_due().await
            }
            _ = actor.monitor.tick() => {
                actor.on_monitor_tick().await
            }
        }

        actor.publish_status();
    }

    actor.surface.clear().await;
    debug!("controller is shutting down")
}
