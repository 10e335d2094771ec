use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::state::RioState;

/// How long a ringing alarm keeps going before it silences itself.
const RINGING_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// How long a spoken reminder holds the screen before resting again.
const REMINDER_LINGER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmKind {
    Alarm,
    Reminder,
}

/// Labels that ask to be woken up ring like an alarm; everything else is a
/// gentler reminder.
pub fn classify_label(label: &str) -> AlarmKind {
    let lower = label.to_lowercase();
    if lower.contains("thức dậy") || lower.contains("báo thức") {
        AlarmKind::Alarm
    } else {
        AlarmKind::Reminder
    }
}

/// Events raised towards the session orchestrator, which must register for
/// them once per session lifecycle.
#[derive(Debug, Clone)]
pub enum AlarmEvent {
    Ring {
        id: u64,
        label: String,
        kind: AlarmKind,
    },
    StateRequest {
        state: RioState,
        status: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct AlarmInfo {
    pub id: u64,
    pub label: String,
    pub kind: AlarmKind,
    pub fire_at: Instant,
}

struct ActiveAlarm {
    info: AlarmInfo,
    handle: JoinHandle<()>,
}

struct RingingAlarm {
    id: u64,
    timeout: JoinHandle<()>,
}

struct Inner {
    event_tx: mpsc::Sender<AlarmEvent>,
    alarms: Mutex<Vec<ActiveAlarm>>,
    ringing: Mutex<Option<RingingAlarm>>,
    next_id: AtomicU64,
}

impl Inner {
    async fn send(&self, event: AlarmEvent) {
        if let Err(e) = self.event_tx.send(event).await {
            tracing::warn!("failed to deliver alarm event: {:?}", e);
        }
    }
}

/// Timer-based alarm/reminder subsystem. Independent of the live session:
/// it raises ring events the orchestrator suspends the session for.
#[derive(Clone)]
pub struct AlarmScheduler {
    inner: Arc<Inner>,
}

impl AlarmScheduler {
    pub fn new(event_tx: mpsc::Sender<AlarmEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                event_tx,
                alarms: Mutex::new(Vec::new()),
                ringing: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Schedules an alarm or reminder to fire after `delay`. The kind is
    /// inferred from the label.
    pub fn schedule(&self, delay: Duration, label: &str) -> AlarmInfo {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let info = AlarmInfo {
            id,
            label: label.to_string(),
            kind: classify_label(label),
            fire_at: Instant::now() + delay,
        };

        let inner = self.inner.clone();
        let fire_at = info.fire_at;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(fire_at).await;
            ring(inner, id).await;
        });

        if let Ok(mut alarms) = self.inner.alarms.lock() {
            alarms.push(ActiveAlarm {
                info: info.clone(),
                handle,
            });
        } else {
            tracing::error!("failed to register alarm #{}", id);
        }
        tracing::info!("scheduled {:?} #{} {:?}", info.kind, id, info.label);
        info
    }

    pub fn cancel(&self, id: u64) {
        let Ok(mut alarms) = self.inner.alarms.lock() else {
            tracing::error!("failed to access the alarm list");
            return;
        };
        if let Some(index) = alarms.iter().position(|alarm| alarm.info.id == id) {
            let alarm = alarms.remove(index);
            alarm.handle.abort();
            tracing::info!("cancelled alarm #{}", id);
        }
    }

    pub fn active(&self) -> Vec<AlarmInfo> {
        match self.inner.alarms.lock() {
            Ok(alarms) => alarms.iter().map(|alarm| alarm.info.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Silences the currently ringing alarm. Idempotent: stopping when
    /// nothing rings does nothing.
    pub async fn stop_ringing(&self) {
        let ringing = match self.inner.ringing.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(ringing) = ringing {
            ringing.timeout.abort();
            tracing::info!("alarm #{} silenced", ringing.id);
            self.inner
                .send(AlarmEvent::StateRequest {
                    state: RioState::Idle,
                    status: Some("Báo thức đã tắt.".to_string()),
                })
                .await;
        }
    }
}

async fn ring(inner: Arc<Inner>, id: u64) {
    let info = {
        let Ok(mut alarms) = inner.alarms.lock() else {
            tracing::error!("failed to access the alarm list");
            return;
        };
        let Some(index) = alarms.iter().position(|alarm| alarm.info.id == id) else {
            return;
        };
        alarms.remove(index).info
    };

    inner
        .send(AlarmEvent::Ring {
            id: info.id,
            label: info.label.clone(),
            kind: info.kind,
        })
        .await;

    match info.kind {
        AlarmKind::Alarm => {
            inner
                .send(AlarmEvent::StateRequest {
                    state: RioState::AlarmRinging,
                    status: Some(info.label.clone()),
                })
                .await;

            let timeout_inner = inner.clone();
            let timeout = tokio::spawn(async move {
                tokio::time::sleep(RINGING_TIMEOUT).await;
                let still_ringing = match timeout_inner.ringing.lock() {
                    Ok(mut ringing) => matches!(ringing.take(), Some(r) if r.id == id),
                    Err(_) => false,
                };
                if still_ringing {
                    tracing::info!("alarm #{} rang out", id);
                    timeout_inner
                        .send(AlarmEvent::StateRequest {
                            state: RioState::Idle,
                            status: Some("Báo thức đã tắt.".to_string()),
                        })
                        .await;
                }
            });
            if let Ok(mut ringing) = inner.ringing.lock() {
                *ringing = Some(RingingAlarm { id, timeout });
            } else {
                tracing::error!("failed to record the ringing alarm");
            }
        }
        AlarmKind::Reminder => {
            inner
                .send(AlarmEvent::StateRequest {
                    state: RioState::Speaking,
                    status: Some(format!("Nhắc nhở: {}", info.label)),
                })
                .await;

            let linger_inner = inner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(REMINDER_LINGER).await;
                linger_inner
                    .send(AlarmEvent::StateRequest {
                        state: RioState::Idle,
                        status: Some("Rio đang nghỉ ngơi...".to_string()),
                    })
                    .await;
            });
        }
    }
}
