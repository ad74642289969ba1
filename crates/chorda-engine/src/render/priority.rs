//! Real-time scheduling for render threads.

/// Priority decrement between attempts.
pub const PRIORITY_STEP: i32 = 10;

/// Outcome of [`promote_current_thread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// Running under `SCHED_FIFO` at the given priority.
    Realtime(i32),
    /// No elevated class could be obtained; the thread keeps normal scheduling.
    Normal,
}

/// Priorities tried in order: from `max` stepping down by [`PRIORITY_STEP`]
/// while still at or above `min`.
pub fn priority_ladder(max: i32, min: i32) -> impl Iterator<Item = i32> {
    let min = min.max(1);
    std::iter::successors(Some(max), |p| Some(p - PRIORITY_STEP)).take_while(move |p| *p >= min)
}

/// Moves the calling thread into the FIFO real-time class at the highest
/// priority the system grants.
pub fn promote_current_thread() -> Promotion {
    let promotion = try_promote();
    match promotion {
        Promotion::Realtime(priority) => {
            tracing::info!(priority, "render thread running with realtime priority");
        }
        Promotion::Normal => {
            tracing::warn!(
                "unable to obtain realtime priority; audio effects may glitch under load"
            );
        }
    }
    promotion
}

#[cfg(target_os = "linux")]
fn try_promote() -> Promotion {
    let (max, min) = unsafe {
        (
            libc::sched_get_priority_max(libc::SCHED_FIFO),
            libc::sched_get_priority_min(libc::SCHED_FIFO),
        )
    };
    if max < 0 || min < 0 {
        return Promotion::Normal;
    }

    for priority in priority_ladder(max, min) {
        match apply_realtime_priority(priority) {
            Ok(()) => return Promotion::Realtime(priority),
            Err(errno) => tracing::debug!(priority, errno, "realtime priority refused"),
        }
    }
    Promotion::Normal
}

#[cfg(not(target_os = "linux"))]
fn try_promote() -> Promotion {
    Promotion::Normal
}

#[cfg(target_os = "linux")]
fn apply_realtime_priority(priority: i32) -> Result<(), i32> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let result = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if result != 0 {
        return Err(result);
    }
    Ok(())
}
