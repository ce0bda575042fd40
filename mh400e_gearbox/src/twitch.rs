//! Spindle twitch helper.
//!
//! While the shafts move, gear teeth can butt against each other instead of
//! meshing. The twitcher nudges the spindle motor alternately clockwise and
//! counter-clockwise in short pulses so the teeth slip into place. It runs on
//! its own countdown, independent of the shift cascade, and is ticked on every
//! gearbox tick.

use mh400e_common::config::TimingConfig;
use tracing::debug;

use crate::delay::DelayTimer;

/// Pulse mechanism driven alongside a shift.
///
/// `tick` is called on every gearbox tick, shifting or not. `stop` and
/// `stop_completed` are polled by the stop phase until the helper has
/// released its outputs.
pub trait PulseHelper {
    /// Begin pulsing; called once at shift start.
    fn start(&mut self, period_ns: i64);

    /// Request the pulse train to end. Idempotent.
    fn stop(&mut self, period_ns: i64);

    /// Advance by one period.
    fn tick(&mut self, period_ns: i64);

    /// True once every output is released and nothing is pending.
    fn stop_completed(&self) -> bool;

    /// Spindle pins for the host to write this cycle.
    fn outputs(&self) -> TwitchOutputs {
        TwitchOutputs::default()
    }
}

/// Helper for machines without twitch wiring.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPulse;

impl PulseHelper for NoPulse {
    fn start(&mut self, _period_ns: i64) {}
    fn stop(&mut self, _period_ns: i64) {}
    fn tick(&mut self, _period_ns: i64) {}

    fn stop_completed(&self) -> bool {
        true
    }
}

/// Spindle motor pins driven by the twitcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwitchOutputs {
    /// Clockwise pulse.
    pub cw: bool,
    /// Counter-clockwise pulse.
    pub ccw: bool,
}

impl TwitchOutputs {
    #[inline]
    pub const fn any(&self) -> bool {
        self.cw || self.ccw
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TwitchState {
    Idle,
    Pulsing,
    Stopping,
}

/// Alternating spindle pulse generator.
#[derive(Debug, Clone)]
pub struct Twitcher {
    state: TwitchState,
    outputs: TwitchOutputs,
    /// Direction of the next pulse.
    next_ccw: bool,
    delay: DelayTimer,
    keep_on_ns: i64,
    keep_off_ns: i64,
}

impl Twitcher {
    pub fn new(timing: &TimingConfig) -> Self {
        Self {
            state: TwitchState::Idle,
            outputs: TwitchOutputs::default(),
            next_ccw: false,
            delay: DelayTimer::new(),
            keep_on_ns: timing.twitch_keep_pin_on_ns,
            keep_off_ns: timing.twitch_keep_pin_off_ns,
        }
    }

    /// Current spindle pulse pins.
    #[inline]
    pub const fn outputs(&self) -> TwitchOutputs {
        self.outputs
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state != TwitchState::Idle
    }

    fn pulse(&mut self) {
        if self.outputs.any() {
            self.outputs = TwitchOutputs::default();
            self.delay.arm(self.keep_off_ns);
            return;
        }
        if self.next_ccw {
            self.outputs.ccw = true;
        } else {
            self.outputs.cw = true;
        }
        self.next_ccw = !self.next_ccw;
        self.delay.arm(self.keep_on_ns);
    }

    fn drain(&mut self, period_ns: i64) {
        if self.outputs.any() {
            self.outputs = TwitchOutputs::default();
            self.delay.arm(self.keep_off_ns);
            return;
        }
        if self.delay.wait(period_ns) {
            return;
        }
        self.state = TwitchState::Idle;
        debug!("twitch stopped");
    }
}

impl PulseHelper for Twitcher {
    fn start(&mut self, _period_ns: i64) {
        self.state = TwitchState::Pulsing;
        self.outputs = TwitchOutputs::default();
        self.next_ccw = false;
        // Leave the shafts a head start before the first nudge.
        self.delay.arm(self.keep_off_ns);
        debug!("twitch started");
    }

    fn stop(&mut self, _period_ns: i64) {
        if self.state == TwitchState::Pulsing {
            self.state = TwitchState::Stopping;
        }
    }

    fn tick(&mut self, period_ns: i64) {
        match self.state {
            TwitchState::Idle => {}
            TwitchState::Pulsing => {
                if !self.delay.wait(period_ns) {
                    self.pulse();
                }
            }
            TwitchState::Stopping => self.drain(period_ns),
        }
    }

    fn stop_completed(&self) -> bool {
        self.state == TwitchState::Idle
    }

    fn outputs(&self) -> TwitchOutputs {
        self.outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: i64 = 1_000;

    fn twitcher() -> Twitcher {
        let timing = TimingConfig {
            twitch_keep_pin_on_ns: 2_000,
            twitch_keep_pin_off_ns: 3_000,
            ..TimingConfig::default()
        };
        Twitcher::new(&timing)
    }

    fn run(t: &mut Twitcher, ticks: usize) -> Vec<TwitchOutputs> {
        (0..ticks)
            .map(|_| {
                t.tick(PERIOD);
                t.outputs()
            })
            .collect()
    }

    #[test]
    fn idle_twitcher_is_complete_and_quiet() {
        let mut t = twitcher();
        assert!(t.stop_completed());
        assert!(run(&mut t, 10).iter().all(|o| !o.any()));
    }

    #[test]
    fn pulses_alternate_direction() {
        let mut t = twitcher();
        t.start(PERIOD);
        assert!(!t.stop_completed());

        let trace = run(&mut t, 40);
        let mut pulses = Vec::new();
        let mut last = TwitchOutputs::default();
        for out in trace {
            if out.any() && !last.any() {
                pulses.push(out);
            }
            last = out;
        }
        assert!(pulses.len() >= 3);
        assert!(pulses.iter().all(|p| p.cw != p.ccw));
        for pair in pulses.windows(2) {
            assert_ne!(pair[0].cw, pair[1].cw);
        }
        assert!(pulses[0].cw);
    }

    #[test]
    fn both_pins_never_on_together() {
        let mut t = twitcher();
        t.start(PERIOD);
        assert!(run(&mut t, 100).iter().all(|o| !(o.cw && o.ccw)));
    }

    #[test]
    fn stop_releases_pins_then_completes() {
        let mut t = twitcher();
        t.start(PERIOD);
        while !t.outputs().any() {
            t.tick(PERIOD);
        }
        t.stop(PERIOD);
        t.tick(PERIOD);
        assert!(!t.outputs().any());
        assert!(!t.stop_completed());

        run(&mut t, 10);
        assert!(t.stop_completed());
        assert!(!t.is_active());
    }

    #[test]
    fn stop_is_idempotent() {
        let mut t = twitcher();
        t.start(PERIOD);
        for _ in 0..20 {
            t.stop(PERIOD);
            t.tick(PERIOD);
        }
        assert!(t.stop_completed());
        t.stop(PERIOD);
        assert!(t.stop_completed());
    }

    #[test]
    fn no_pulse_is_always_complete() {
        let mut p = NoPulse;
        p.start(PERIOD);
        p.tick(PERIOD);
        assert!(p.stop_completed());
        assert!(!p.outputs().any());
    }

    #[test]
    fn helper_outputs_match_twitcher_pins() {
        fn pins<P: PulseHelper>(p: &P) -> TwitchOutputs {
            p.outputs()
        }
        let mut t = twitcher();
        t.start(PERIOD);
        let mut seen = false;
        for _ in 0..20 {
            t.tick(PERIOD);
            assert_eq!(pins(&t), t.outputs());
            seen |= pins(&t).any();
        }
        assert!(seen);
    }
}
