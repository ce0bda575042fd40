//! Host cycle: sample → tick → write.
//!
//! Drives a [`Gearbox`] against the simulated plant at the configured cycle
//! time, the way the machine's real-time thread drives it against the pins.
//!
//! ## RT Setup Sequence
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity`: pin to an isolated CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, prio)`.
//!
//! All four steps are no-ops without the `rt` feature.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mh400e_common::config::{ConfigError, GearboxConfig};
use mh400e_common::gears::{Gear, GearLookup, GearTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::gearbox::{Gearbox, ShiftFault, ShiftStatus};
use crate::sim::{GearboxPlant, PlantConfig};
use crate::twitch::{PulseHelper, Twitcher};

// ─── Configuration ──────────────────────────────────────────────────

/// Runner configuration file: the gearbox sections plus `[plant]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(flatten)]
    pub gearbox: GearboxConfig,

    #[serde(default)]
    pub plant: PlantConfig,
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-cycle timing statistics.
#[derive(Debug, Clone)]
pub struct CycleStats {
    /// Total cycles executed.
    pub cycle_count: u64,
    /// Minimum cycle body duration [ns].
    pub min_cycle_ns: i64,
    /// Maximum cycle body duration [ns].
    pub max_cycle_ns: i64,
    /// Running sum for average computation.
    pub sum_cycle_ns: i64,
    /// Cycles whose body exceeded the cycle time.
    pub overruns: u64,
}

impl CycleStats {
    pub const fn new() -> Self {
        Self {
            cycle_count: 0,
            min_cycle_ns: i64::MAX,
            max_cycle_ns: 0,
            sum_cycle_ns: 0,
            overruns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: i64, budget_ns: i64) {
        self.cycle_count += 1;
        self.min_cycle_ns = self.min_cycle_ns.min(duration_ns);
        self.max_cycle_ns = self.max_cycle_ns.max(duration_ns);
        self.sum_cycle_ns = self.sum_cycle_ns.saturating_add(duration_ns);
        if duration_ns > budget_ns {
            self.overruns += 1;
        }
    }

    /// Average cycle time [ns] (0 if no cycles).
    #[inline]
    pub fn avg_cycle_ns(&self) -> i64 {
        if self.cycle_count == 0 {
            0
        } else {
            self.sum_cycle_ns / self.cycle_count as i64
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Errors ─────────────────────────────────────────────────────────

/// Errors during RT setup or a shift run.
#[derive(Debug, Error)]
pub enum CycleError {
    /// RT system call failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Requested speed is not in the gear table.
    #[error("no gear for {0} rpm")]
    UnknownGear(u16),

    /// Shift fault with escalation enabled.
    #[error("shift aborted: {0}")]
    Fault(#[from] ShiftFault),

    /// Shift still running when the cycle limit was reached.
    #[error("shift not complete after {cycles} cycles")]
    CycleLimit { cycles: u64 },

    /// Shutdown requested mid-shift.
    #[error("interrupted after {cycles} cycles")]
    Interrupted { cycles: u64 },
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), CycleError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| CycleError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), CycleError> {
    Ok(())
}

/// Touch stack pages so the loop never faults them in.
#[cfg(feature = "rt")]
fn prefault_stack() {
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        // SAFETY: `byte` is a valid exclusive reference into `buf`.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(not(feature = "rt"))]
fn prefault_stack() {}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), CycleError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| CycleError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| CycleError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpu: usize) -> Result<(), CycleError> {
    Ok(())
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), CycleError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: `param` outlives the call; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(CycleError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), CycleError> {
    Ok(())
}

/// Full RT setup sequence. Call before the first cycle.
pub fn rt_setup(cpu_core: usize, rt_priority: i32) -> Result<(), CycleError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(cpu_core)?;
    rt_set_scheduler(rt_priority)?;
    Ok(())
}

// ─── Shift Runner ───────────────────────────────────────────────────

/// Outcome of [`ShiftRunner::run_shift`].
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Cycles executed for this shift.
    pub cycles: u64,
    /// Faults logged without escalation.
    pub faults: u32,
    /// Gear the sensors show after the shift.
    pub gear: Option<Gear>,
    pub stats: CycleStats,
}

/// Owns a gearbox and the plant it drives.
pub struct ShiftRunner<P = Twitcher, L = GearTable> {
    gearbox: Gearbox<P, L>,
    plant: GearboxPlant,
    escalate_faults: bool,
    period: Duration,
}

impl ShiftRunner<Twitcher, GearTable> {
    /// Build from a runner configuration with the plant seated at `from_rpm`.
    pub fn from_config(config: &RunnerConfig, from_rpm: u16) -> Result<Self, CycleError> {
        let gearbox = Gearbox::from_config(&config.gearbox)?;
        let from = *gearbox
            .gears()
            .by_rpm(from_rpm)
            .ok_or(CycleError::UnknownGear(from_rpm))?;
        let plant = GearboxPlant::at_gear(&config.plant, &from);
        Ok(Self::new(gearbox, plant, config.gearbox.watchdog.escalate_faults))
    }
}

impl<P: PulseHelper, L: GearLookup> ShiftRunner<P, L> {
    pub fn new(gearbox: Gearbox<P, L>, plant: GearboxPlant, escalate_faults: bool) -> Self {
        let period = Duration::from_nanos(gearbox.timing().period_ns().unsigned_abs());
        Self {
            gearbox,
            plant,
            escalate_faults,
            period,
        }
    }

    #[inline]
    pub fn gearbox(&self) -> &Gearbox<P, L> {
        &self.gearbox
    }

    #[inline]
    pub fn plant(&self) -> &GearboxPlant {
        &self.plant
    }

    #[inline]
    pub fn plant_mut(&mut self) -> &mut GearboxPlant {
        &mut self.plant
    }

    /// Shift into the gear with nominal speed `rpm`.
    ///
    /// Runs until the stop phase completes, `max_cycles` is reached or
    /// `running` drops. With `paced` set, each cycle sleeps out the rest of
    /// the cycle time; otherwise cycles run back to back on simulated time.
    pub fn run_shift(
        &mut self,
        rpm: u16,
        max_cycles: u64,
        running: &AtomicBool,
        paced: bool,
    ) -> Result<RunReport, CycleError> {
        let target = *self
            .gearbox
            .gears()
            .by_rpm(rpm)
            .ok_or(CycleError::UnknownGear(rpm))?;
        let period_ns = self.gearbox.timing().period_ns();

        self.gearbox.sample(&self.plant.inputs());
        self.gearbox.start(&target, period_ns)?;

        let mut stats = CycleStats::new();
        let mut faults = 0u32;
        let mut complete = false;

        while stats.cycle_count < max_cycles {
            if !running.load(Ordering::SeqCst) {
                warn!(cycles = stats.cycle_count, "shutdown requested mid-shift");
                return Err(CycleError::Interrupted {
                    cycles: stats.cycle_count,
                });
            }

            let cycle_start = Instant::now();
            let status = match self.cycle_body(period_ns) {
                Ok(status) => status,
                Err(fault) if !self.escalate_faults => {
                    faults += 1;
                    warn!(%fault, "shift fault");
                    if self.gearbox.is_shifting() {
                        ShiftStatus::InProgress
                    } else {
                        ShiftStatus::Complete
                    }
                }
                Err(fault) => {
                    error!(%fault, "shift fault, escalating");
                    return Err(fault.into());
                }
            };
            let elapsed = cycle_start.elapsed();
            stats.record(elapsed.as_nanos() as i64, period_ns);

            if status == ShiftStatus::Complete {
                complete = true;
                break;
            }
            if paced {
                if let Some(remaining) = self.period.checked_sub(elapsed) {
                    std::thread::sleep(remaining);
                }
            }
        }

        if !complete {
            return Err(CycleError::CycleLimit {
                cycles: stats.cycle_count,
            });
        }

        let inputs = self.plant.inputs();
        let gear = self.gearbox.current_gear(&inputs).copied();
        info!(
            target_rpm = rpm,
            reached_rpm = gear.map(|g| g.rpm),
            cycles = stats.cycle_count,
            faults,
            avg_cycle_ns = stats.avg_cycle_ns(),
            max_cycle_ns = stats.max_cycle_ns,
            "shift run finished"
        );
        Ok(RunReport {
            cycles: stats.cycle_count,
            faults,
            gear,
            stats,
        })
    }

    /// One cycle: read sensors, tick, write outputs and twitch pins to the plant.
    fn cycle_body(&mut self, period_ns: i64) -> Result<ShiftStatus, ShiftFault> {
        let inputs = self.plant.inputs();
        self.gearbox.sample(&inputs);
        let result = self.gearbox.tick(period_ns);
        let outputs = self.gearbox.outputs();
        self.plant.advance(&outputs, self.period);
        self.plant.twitch(self.gearbox.pulse().outputs());
        if result == Ok(ShiftStatus::Complete) {
            debug!(?outputs, "final outputs");
        }
        result
    }
}
