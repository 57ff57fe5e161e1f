// 50 Hz control loop with watchdog for one swerve module
// If the coordinator stops sending commands the wheel is stopped, holding
// its last commanded heading.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::config::{
    Backend, CMD_TIMEOUT, LOOP_HZ, ModulePlacement, RuntimeArgs, topic_cmd, topic_health,
    topic_state,
};
use crate::messages::{ModuleRequest, ModuleTelemetry, RuntimeHealth};
use crate::module::{
    AbsoluteSensorHandle, ActuatorHandle, FeetechAbsoluteSensor, FeetechActuator, FeetechBus,
    ModuleConfiguration, ModuleState, SharedBus, SimAbsoluteSensor, SimActuator, SwerveModule,
};

pub struct Runtime {
    latest_cmd: Option<ModuleState>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    // A request failed since the last control cycle
    request_fault: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            request_fault: false,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    fn on_command(&mut self, cmd: ModuleState) {
        debug!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Apply one request from the coordinator
    pub fn on_request<A, S>(&mut self, module: &mut SwerveModule<A, S>, request: ModuleRequest)
    where
        A: ActuatorHandle,
        S: AbsoluteSensorHandle,
    {
        match request {
            ModuleRequest::SetState { speed, angle } => {
                self.on_command(ModuleState::new(speed, angle))
            }
            ModuleRequest::ResetEncoders => {
                info!("Resetting driving encoder");
                if let Err(e) = module.reset_encoders() {
                    warn!("Encoder reset failed: {}", e);
                    self.request_fault = true;
                }
            }
        }
    }

    /// Wheel command for this cycle, zero speed once the command is stale
    fn compute_command(&mut self, hold_angle: f64) -> ModuleState {
        let cmd_age = self.cmd_received_at.elapsed();

        match self.latest_cmd {
            Some(cmd) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                cmd
            }
            Some(_) => {
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping wheel", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                ModuleState::new(0.0, hold_angle)
            }
            None => {
                self.health = RuntimeHealth::CmdStale;
                ModuleState::new(0.0, hold_angle)
            }
        }
    }

    /// Send this cycle's setpoint and sample the module.
    ///
    /// Failures only affect this cycle; the next one writes again.
    pub fn control_cycle<A, S>(
        &mut self,
        module: &mut SwerveModule<A, S>,
    ) -> Option<ModuleTelemetry>
    where
        A: ActuatorHandle,
        S: AbsoluteSensorHandle,
    {
        let command = self.compute_command(module.desired_state().angle);
        if std::mem::take(&mut self.request_fault) {
            self.health = RuntimeHealth::Fault;
        }
        if let Err(e) = module.set_desired_state(command) {
            warn!("Setpoint write failed: {}", e);
            self.health = RuntimeHealth::Fault;
        }

        let sample = module
            .state()
            .and_then(|state| module.position().map(|position| (state, position)));
        match sample {
            Ok((state, position)) => Some(ModuleTelemetry {
                state,
                position,
                desired: module.desired_state(),
                health: self.health,
            }),
            Err(e) => {
                warn!("Module read failed: {}", e);
                self.health = RuntimeHealth::Fault;
                None
            }
        }
    }
}

pub async fn run(args: RuntimeArgs) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Built once, shared by every module constructed in this process
    let config = ModuleConfiguration::default();
    let offset = args.offset();
    let (driving_id, steering_id, sensor_id) = args.ids();

    info!(
        "Starting {} module ({:?} backend), offset {:.4} rad",
        args.placement, args.backend, offset
    );

    match args.backend {
        Backend::Sim => {
            let driving = SimActuator::new(driving_id);
            let steering = SimActuator::new(steering_id);
            let module = SwerveModule::new(
                driving.clone(),
                steering.clone(),
                SimAbsoluteSensor::new(args.sim_absolute),
                offset,
                &config,
            )?;
            serve(module, args.placement, move |dt| {
                driving.advance(dt);
                steering.advance(dt);
            })
            .await
        }
        Backend::Feetech => {
            let bus = SharedBus::new(FeetechBus::open(&args.port)?);
            let module = SwerveModule::new(
                FeetechActuator::new(bus.clone(), driving_id),
                FeetechActuator::new(bus.clone(), steering_id),
                FeetechAbsoluteSensor::new(bus, sensor_id),
                offset,
                &config,
            )?;
            serve(module, args.placement, |_| {}).await
        }
    }
}

/// Run the control loop, `advance` is called with the tick length in seconds
async fn serve<A, S>(
    mut module: SwerveModule<A, S>,
    placement: ModulePlacement,
    mut advance: impl FnMut(f64),
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    A: ActuatorHandle,
    S: AbsoluteSensorHandle,
{
    let topic_cmd = topic_cmd(placement);
    let topic_state = topic_state(placement);
    let topic_health = topic_health(placement);

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(topic_cmd.as_str()).await?;
    let pub_state = session.declare_publisher(topic_state.as_str()).await?;
    let pub_health = session.declare_publisher(topic_health.as_str()).await?;

    let mut runtime = Runtime::new();
    let period = Duration::from_millis(1000 / LOOP_HZ);
    let mut tick = interval(period);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", topic_cmd);
    info!("Publishing to: {}, {}", topic_state, topic_health);

    loop {
        tick.tick().await;

        // 1. Drain all pending requests (non-blocking)
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<ModuleRequest>(&payload) {
                Ok(request) => runtime.on_request(&mut module, request),
                Err(e) => warn!("Failed to parse request: {}", e),
            }
        }

        // 2. Command the module (includes watchdog logic)
        let telemetry = runtime.control_cycle(&mut module);
        advance(period.as_secs_f64());

        // 3. Publish telemetry
        if let Some(telemetry) = telemetry {
            pub_state.put(serde_json::to_string(&telemetry)?).await?;
        }

        // 4. Publish health
        pub_health.put(serde_json::to_string(&runtime.health)?).await?;
    }
}
