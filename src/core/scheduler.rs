use std::time::{Duration, Instant};

use crate::core::config::{CuriositySettings, StructuredTask, TasksConfig};

/// How often the poll loop re-checks whether any timer is due.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Time source for the scheduler. Tests inject a manual clock so cadence
/// behavior is checked without wall-clock sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A repeating timer with an explicit next-due instant. Fresh timers are
/// due immediately, which gives every task its startup fire.
#[derive(Debug)]
pub struct CadenceTimer {
    interval: Duration,
    next_due: Instant,
}

impl CadenceTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now,
        }
    }

    /// Fire at most once per check. A late timer (the loop was busy) fires
    /// as soon as it is polled and re-arms from `now`; missed ticks are
    /// not backfilled.
    pub fn fire_due(&mut self, now: Instant) -> bool {
        if now >= self.next_due {
            self.next_due = now + self.interval;
            true
        } else {
            false
        }
    }
}

pub fn cadence_interval(hours: f64) -> Duration {
    Duration::from_secs_f64(hours * 3600.0)
}

/// What a due timer wants done.
#[derive(Debug, Clone)]
pub enum Fire {
    Structured(StructuredTask),
    Curiosity(CuriositySettings),
}

/// Independent per-task timers driven by one cooperative poll loop.
pub struct Scheduler<C: Clock> {
    clock: C,
    structured: Vec<(StructuredTask, CadenceTimer)>,
    curiosity: Option<(CuriositySettings, CadenceTimer)>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, tasks: &TasksConfig) -> Self {
        let now = clock.now();
        let structured = tasks
            .structured_tasks
            .iter()
            .map(|task| {
                let timer = CadenceTimer::new(cadence_interval(task.cadence_hours), now);
                (task.clone(), timer)
            })
            .collect();
        let curiosity = tasks.curiosity.enabled.then(|| {
            let timer = CadenceTimer::new(cadence_interval(tasks.curiosity.cadence_hours), now);
            (tasks.curiosity.clone(), timer)
        });
        Self {
            clock,
            structured,
            curiosity,
        }
    }

    /// All fires due right now, structured tasks first.
    pub fn due_fires(&mut self) -> Vec<Fire> {
        let now = self.clock.now();
        let mut fires = Vec::new();
        for (task, timer) in &mut self.structured {
            if timer.fire_due(now) {
                fires.push(Fire::Structured(task.clone()));
            }
        }
        if let Some((settings, timer)) = &mut self.curiosity
            && timer.fire_due(now)
        {
            fires.push(Fire::Curiosity(settings.clone()));
        }
        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<Instant>>);

    impl ManualClock {
        fn start() -> Self {
            Self(Arc::new(Mutex::new(Instant::now())))
        }

        fn advance(&self, d: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += d;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    fn tasks_yaml(yaml: &str) -> TasksConfig {
        TasksConfig::parse(yaml).unwrap()
    }

    #[test]
    fn every_task_fires_once_at_startup() {
        let config = tasks_yaml(
            r#"
structured_tasks:
  - name: daily_orders
    question: "How many orders today?"
    cadence_hours: 24
    alert_mode: automatic
curiosity:
  enabled: true
  cadence_hours: 1
"#,
        );
        let clock = ManualClock::start();
        let mut scheduler = Scheduler::new(clock.clone(), &config);

        let fires = scheduler.due_fires();
        assert_eq!(fires.len(), 2);
        assert!(matches!(&fires[0], Fire::Structured(t) if t.name == "daily_orders"));
        assert!(matches!(&fires[1], Fire::Curiosity(_)));

        // Nothing is due again until a cadence elapses
        assert!(scheduler.due_fires().is_empty());
    }

    #[test]
    fn cadences_are_independent() {
        let config = tasks_yaml(
            r#"
structured_tasks:
  - name: hourly
    question: "?"
    cadence_hours: 1
  - name: daily
    question: "?"
    cadence_hours: 24
curiosity:
  enabled: false
"#,
        );
        let clock = ManualClock::start();
        let mut scheduler = Scheduler::new(clock.clone(), &config);
        scheduler.due_fires(); // startup pass

        clock.advance(Duration::from_secs(3600));
        let fires = scheduler.due_fires();
        assert_eq!(fires.len(), 1);
        assert!(matches!(&fires[0], Fire::Structured(t) if t.name == "hourly"));

        clock.advance(Duration::from_secs(23 * 3600));
        let names: Vec<String> = scheduler
            .due_fires()
            .iter()
            .map(|f| match f {
                Fire::Structured(t) => t.name.clone(),
                Fire::Curiosity(_) => "curiosity".to_string(),
            })
            .collect();
        assert_eq!(names, vec!["hourly", "daily"]);
    }

    #[test]
    fn missed_ticks_are_not_backfilled() {
        let config = tasks_yaml(
            r#"
curiosity:
  enabled: true
  cadence_hours: 1
"#,
        );
        let clock = ManualClock::start();
        let mut scheduler = Scheduler::new(clock.clone(), &config);
        scheduler.due_fires(); // startup pass

        // The process was stalled for 10 hours: exactly one late fire
        clock.advance(Duration::from_secs(10 * 3600));
        assert_eq!(scheduler.due_fires().len(), 1);
        assert!(scheduler.due_fires().is_empty());

        // Re-armed relative to the late fire, not the original phase
        clock.advance(Duration::from_secs(3599));
        assert!(scheduler.due_fires().is_empty());
        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.due_fires().len(), 1);
    }

    #[test]
    fn fractional_cadence_is_honored() {
        let config = tasks_yaml(
            r#"
structured_tasks:
  - name: half_hourly
    question: "?"
    cadence_hours: 0.5
curiosity:
  enabled: false
"#,
        );
        let clock = ManualClock::start();
        let mut scheduler = Scheduler::new(clock.clone(), &config);
        scheduler.due_fires();

        clock.advance(Duration::from_secs(1799));
        assert!(scheduler.due_fires().is_empty());
        clock.advance(Duration::from_secs(1));
        assert_eq!(scheduler.due_fires().len(), 1);
    }

    #[test]
    fn disabled_curiosity_never_fires() {
        let config = tasks_yaml(
            r#"
curiosity:
  enabled: false
"#,
        );
        let clock = ManualClock::start();
        let mut scheduler = Scheduler::new(clock.clone(), &config);
        assert!(scheduler.due_fires().is_empty());
        clock.advance(Duration::from_secs(100 * 3600));
        assert!(scheduler.due_fires().is_empty());
    }
}
