use std::time::Instant;

/// Canadian byo-yomi clock for one side of a match. `byoyomi_moves == 0`
/// means absolute time (no byo-yomi period at all); `main_time == 0.0 &&
/// byoyomi_time == 0.0 && byoyomi_moves > 0` is the "infinite time" sentinel
/// used for untimed games, which every method below short-circuits on.
pub struct Timer {
    main_time: f64,
    byoyomi_time: f64,
    byoyomi_time_current: f64,
    byoyomi_moves: u32,
    byoyomi_moves_current: u32,
    local_time: Option<Instant>,
}

/// Time remaining for a side, reported back to players and mirrored to KGS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLeft {
    pub seconds: i64,
    pub stones: u32,
}

fn is_infinite(main_time: f64, byoyomi_time: f64, byoyomi_moves: u32) -> bool {
    byoyomi_moves > 0 && main_time == 0.0 && byoyomi_time == 0.0
}

impl Timer {
    pub fn new(main_time: f64, byoyomi_time: f64, byoyomi_moves: u32) -> Self {
        Timer {
            main_time,
            byoyomi_time,
            byoyomi_time_current: byoyomi_time,
            byoyomi_moves,
            byoyomi_moves_current: byoyomi_moves,
            local_time: None,
        }
    }

    fn infinite(&self) -> bool {
        is_infinite(self.main_time, self.byoyomi_time, self.byoyomi_moves)
    }

    /// Begin timing a move; returns the deadline in whole seconds, or `None`
    /// if this clock never expires.
    pub fn start_move(&mut self) -> Option<u64> {
        if self.infinite() {
            return None;
        }
        self.local_time = Some(Instant::now());
        Some((self.main_time + self.byoyomi_time_current).ceil() as u64)
    }

    /// Recompute the deadline mid-move, without resetting the start instant
    /// (used while polling a still-connected player for a move).
    pub fn same_move(&self) -> Option<u64> {
        if self.infinite() {
            return None;
        }
        let elapsed = self
            .local_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let remaining = self.main_time + self.byoyomi_time_current - elapsed;
        Some(remaining.max(0.0).ceil() as u64)
    }

    /// Commit the elapsed time against this clock once a move has been
    /// accepted, rolling over into (and resetting) byo-yomi as needed.
    pub fn end_move(&mut self) -> TimeLeft {
        if self.infinite() {
            return TimeLeft {
                seconds: 0,
                stones: self.byoyomi_moves,
            };
        }
        let elapsed = self
            .local_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        self.main_time -= elapsed;

        if self.main_time <= 0.0 {
            self.byoyomi_moves_current = self.byoyomi_moves_current.saturating_sub(1);
            self.byoyomi_time_current += self.main_time;
            self.main_time = 0.0;
            if self.byoyomi_moves_current == 0 && self.byoyomi_time_current > 0.0 {
                self.byoyomi_time_current = self.byoyomi_time;
                self.byoyomi_moves_current = self.byoyomi_moves;
            }
            TimeLeft {
                seconds: self.byoyomi_time_current as i64,
                stones: self.byoyomi_moves_current,
            }
        } else {
            TimeLeft {
                seconds: self.main_time as i64,
                stones: 0,
            }
        }
    }

    pub fn lost_on_time(&self) -> bool {
        if self.infinite() {
            return false;
        }
        self.byoyomi_time_current + self.main_time <= 0.0
    }

    /// Last committed time without mutating state, used to report `time_left`
    /// for a player who is currently on the move.
    pub fn current_time(&self) -> TimeLeft {
        if self.infinite() {
            return TimeLeft {
                seconds: 0,
                stones: self.byoyomi_moves,
            };
        }
        let elapsed = self
            .local_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let main_time = self.main_time - elapsed;
        if main_time <= 0.0 {
            let byoyomi_time_current = self.byoyomi_time_current + main_time;
            TimeLeft {
                seconds: byoyomi_time_current as i64,
                stones: self.byoyomi_moves_current,
            }
        } else {
            TimeLeft {
                seconds: main_time as i64,
                stones: 0,
            }
        }
    }

    /// Time remaining for a side not currently on the move.
    pub fn last_time(&self) -> TimeLeft {
        if self.infinite() {
            return TimeLeft {
                seconds: 0,
                stones: self.byoyomi_moves,
            };
        }
        if self.main_time > 0.0 {
            TimeLeft {
                seconds: self.main_time as i64,
                stones: 0,
            }
        } else {
            TimeLeft {
                seconds: self.byoyomi_time_current as i64,
                stones: self.byoyomi_moves_current,
            }
        }
    }
}
