//! Clock and scheduler configuration across a fleet.
//!
//! Timing is plain configuration: every participant gets a main clock and
//! a scheduler, and optionally a timing master it synchronizes with.

use std::collections::BTreeMap;

use super::{Result, System};
use crate::rpc::{property_type, PropertyValue};

pub const PROPERTY_MAIN_CLOCK: &str = "clock/main_clock";
pub const PROPERTY_TIME_FACTOR: &str = "clock/time_factor";
pub const PROPERTY_STEP_SIZE: &str = "clock/step_size";
pub const PROPERTY_TIME_UPDATE_TIMEOUT: &str = "clock/time_update_timeout";
pub const PROPERTY_TIMING_MASTER: &str = "clock_synchronization/timing_master";
pub const PROPERTY_SYNC_CYCLE_TIME: &str = "clock_synchronization/sync_cycle_time";
pub const PROPERTY_SCHEDULER: &str = "scheduling/scheduler";

pub const CLOCK_LOCAL_SYSTEM_REALTIME: &str = "local_system_realtime";
pub const CLOCK_LOCAL_SYSTEM_SIMTIME: &str = "local_system_simtime";
pub const CLOCK_SLAVE_MASTER_ON_DEMAND: &str = "slave_master_on_demand";
pub const CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE: &str = "slave_master_on_demand_discrete";

pub const SCHEDULER_CLOCK_BASED: &str = "clock_based_scheduler";

/// Timing setup pushed to a whole fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfiguration {
    /// Main clock of the timing master.
    pub master_clock: String,
    /// Main clock of every other participant.
    pub slave_clock: String,
    pub scheduler: String,
    /// Participant the others synchronize with.
    pub master: Option<String>,
    /// Step size of the master's discrete clock, in nanoseconds.
    pub master_time_step_size: Option<String>,
    pub master_time_factor: Option<String>,
    /// How often slaves synchronize with the master, in nanoseconds.
    pub slave_sync_cycle_time: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl TimingConfiguration {
    /// Every participant runs on its own realtime clock.
    pub fn no_master() -> Self {
        Self {
            master_clock: String::new(),
            slave_clock: CLOCK_LOCAL_SYSTEM_REALTIME.to_string(),
            scheduler: SCHEDULER_CLOCK_BASED.to_string(),
            master: None,
            master_time_step_size: None,
            master_time_factor: None,
            slave_sync_cycle_time: None,
        }
    }

    /// Slaves follow the master's realtime clock and interpolate between
    /// synchronizations.
    pub fn clock_sync_only_interpolation(master: &str, slave_sync_cycle_time: &str) -> Self {
        Self {
            master_clock: CLOCK_LOCAL_SYSTEM_REALTIME.to_string(),
            slave_clock: CLOCK_SLAVE_MASTER_ON_DEMAND.to_string(),
            master: non_empty(master),
            slave_sync_cycle_time: non_empty(slave_sync_cycle_time),
            ..Self::no_master()
        }
    }

    /// Slaves follow the master's realtime clock in discrete jumps.
    pub fn clock_sync_only_discrete(master: &str, slave_sync_cycle_time: &str) -> Self {
        Self {
            slave_clock: CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE.to_string(),
            ..Self::clock_sync_only_interpolation(master, slave_sync_cycle_time)
        }
    }

    /// The master steps a simulation clock scaled by `time_factor`.
    pub fn discrete_steps(master: &str, master_time_step_size: &str, time_factor: &str) -> Self {
        Self {
            master_clock: CLOCK_LOCAL_SYSTEM_SIMTIME.to_string(),
            slave_clock: CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE.to_string(),
            scheduler: SCHEDULER_CLOCK_BASED.to_string(),
            master: non_empty(master),
            master_time_step_size: non_empty(master_time_step_size),
            master_time_factor: non_empty(time_factor),
            slave_sync_cycle_time: None,
        }
    }

    /// Discrete steps as fast as possible.
    pub fn afap(master: &str, master_time_step_size: &str) -> Self {
        Self::discrete_steps(master, master_time_step_size, "0.0")
    }
}

impl System {
    /// Push `config` to every participant.
    pub async fn configure_timing(&self, config: &TimingConfiguration) -> Result<()> {
        let master = config.master.as_deref().unwrap_or("");
        self.set_property_value_to_all(
            PROPERTY_TIMING_MASTER,
            property_type::STRING,
            master,
            None,
            true,
        )
        .await?;
        self.set_property_value_to_all(
            PROPERTY_SCHEDULER,
            property_type::STRING,
            &config.scheduler,
            None,
            true,
        )
        .await?;

        let Some(master) = config.master.as_deref() else {
            return self
                .set_property_value_to_all(
                    PROPERTY_MAIN_CLOCK,
                    property_type::STRING,
                    &config.slave_clock,
                    None,
                    true,
                )
                .await;
        };

        self.set_property_value_to_all(
            PROPERTY_MAIN_CLOCK,
            property_type::STRING,
            &config.slave_clock,
            Some(master),
            true,
        )
        .await?;
        self.set_property_value(
            master,
            PROPERTY_MAIN_CLOCK,
            property_type::STRING,
            &config.master_clock,
        )
        .await?;
        if let Some(factor) = &config.master_time_factor {
            self.set_property_value(master, PROPERTY_TIME_FACTOR, property_type::DOUBLE, factor)
                .await?;
        }
        if let Some(step) = &config.master_time_step_size {
            self.set_property_value(master, PROPERTY_STEP_SIZE, property_type::INT32, step)
                .await?;
        }
        if let Some(cycle) = &config.slave_sync_cycle_time {
            self.set_property_value_to_all(
                PROPERTY_SYNC_CYCLE_TIME,
                property_type::INT32,
                cycle,
                Some(master),
                true,
            )
            .await?;
        }
        Ok(())
    }

    pub async fn configure_timing_no_master(&self) -> Result<()> {
        self.configure_timing(&TimingConfiguration::no_master()).await
    }

    pub async fn configure_timing_clock_sync_only_interpolation(
        &self,
        master: &str,
        slave_sync_cycle_time: &str,
    ) -> Result<()> {
        self.configure_timing(&TimingConfiguration::clock_sync_only_interpolation(
            master,
            slave_sync_cycle_time,
        ))
        .await
    }

    pub async fn configure_timing_clock_sync_only_discrete(
        &self,
        master: &str,
        slave_sync_cycle_time: &str,
    ) -> Result<()> {
        self.configure_timing(&TimingConfiguration::clock_sync_only_discrete(
            master,
            slave_sync_cycle_time,
        ))
        .await
    }

    pub async fn configure_timing_discrete_steps(
        &self,
        master: &str,
        master_time_step_size: &str,
        time_factor: &str,
    ) -> Result<()> {
        self.configure_timing(&TimingConfiguration::discrete_steps(
            master,
            master_time_step_size,
            time_factor,
        ))
        .await
    }

    pub async fn configure_timing_afap(
        &self,
        master: &str,
        master_time_step_size: &str,
    ) -> Result<()> {
        self.configure_timing(&TimingConfiguration::afap(master, master_time_step_size))
            .await
    }

    /// Names of the timing masters the participants are configured with,
    /// in order of first appearance.
    pub async fn current_timing_masters(&self) -> Result<Vec<String>> {
        let mut masters: Vec<String> = Vec::new();
        for participant in &self.participants {
            let configuration = participant.configuration().await?;
            let Some(configuration) = configuration.get() else {
                continue;
            };
            let Ok(node) = configuration.properties("clock_synchronization").await else {
                continue;
            };
            let master = node.get_property("timing_master").await;
            if !master.is_empty() && !masters.contains(&master) {
                masters.push(master);
            }
        }
        Ok(masters)
    }

    /// Timing properties of every participant, keyed by participant name
    /// and property path.
    ///
    /// Clock settings beyond the main clock are only reported for
    /// participants that have a timing master.
    pub async fn timing_properties(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<String, PropertyValue>>> {
        let mut result = BTreeMap::new();
        for participant in &self.participants {
            let mut values = BTreeMap::new();
            let name = participant.name();

            let main_clock = self.property_value(name, PROPERTY_MAIN_CLOCK).await?;
            if let Some(value) = main_clock {
                values.insert(PROPERTY_MAIN_CLOCK.to_string(), value);
            }

            let master = self.property_value(name, PROPERTY_TIMING_MASTER).await?;
            if let Some(master) = master.filter(|m| !m.value.is_empty()) {
                values.insert(PROPERTY_TIMING_MASTER.to_string(), master);
                for path in [
                    PROPERTY_TIME_FACTOR,
                    PROPERTY_STEP_SIZE,
                    PROPERTY_TIME_UPDATE_TIMEOUT,
                    PROPERTY_SYNC_CYCLE_TIME,
                ] {
                    if let Some(value) = self.property_value(name, path).await? {
                        values.insert(path.to_string(), value);
                    }
                }
            }

            if let Some(value) = self.property_value(name, PROPERTY_SCHEDULER).await? {
                values.insert(PROPERTY_SCHEDULER.to_string(), value);
            }
            result.insert(name.to_string(), values);
        }
        Ok(result)
    }
}
