use std::sync::RwLock;

/// Slot indices of a [`StatSet`].
///
/// One fixed set of slots covers byte counters, hits per status class, hits
/// per method and the per-method microsecond timers; the service keeps one
/// instance for counters and one for timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Stat {
    BytesRead = 0,
    BytesWritten,

    Hits2xx,
    Hits403,
    Hits404,
    Hits4xx,
    Hits5xx,

    HitsPut,
    HitsGet,
    HitsDel,
    HitsStat,
    HitsOther,
    HitsTotal,

    TimePut,
    TimeGet,
    TimeDel,
    TimeStat,
    TimeOther,
    TimeTotal,
}

pub const STAT_COUNT: usize = Stat::TimeTotal as usize + 1;

pub const STAT_NAMES: [&str; STAT_COUNT] = [
    "rep.bread",
    "rep.bwritten",
    "rep.hits.2xx",
    "rep.hits.403",
    "rep.hits.404",
    "rep.hits.4xx",
    "rep.hits.5xx",
    "rep.hits.put",
    "rep.hits.get",
    "rep.hits.del",
    "rep.hits.stat",
    "rep.hits.other",
    "rep.hits",
    "rep.time.put",
    "rep.time.get",
    "rep.time.del",
    "rep.time.stat",
    "rep.time.other",
    "rep.time",
];

/// Fixed-cardinality counters behind a reader/writer lock.
///
/// Writers take the lock briefly per increment; readers snapshot the whole
/// array at once.
#[derive(Debug, Default)]
pub struct StatSet {
    values: RwLock<[u64; STAT_COUNT]>,
}

impl StatSet {
    pub fn new() -> Self {
        StatSet::default()
    }

    pub fn increment(&self, which: Stat) {
        self.add(which, 1);
    }

    pub fn add(&self, which: Stat, inc: u64) {
        let mut values = self.values.write().unwrap();
        values[which as usize] += inc;
    }

    /// Copy of all slots, taken under the read lock.
    pub fn snapshot(&self) -> [u64; STAT_COUNT] {
        *self.values.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_cover_all_slots() {
        assert_eq!(STAT_NAMES.len(), STAT_COUNT);
        assert_eq!(STAT_NAMES[Stat::HitsTotal as usize], "rep.hits");
        assert_eq!(STAT_NAMES[Stat::TimeTotal as usize], "rep.time");
    }

    #[test]
    fn test_increment_and_add() {
        let s = StatSet::new();
        s.increment(Stat::HitsPut);
        s.increment(Stat::HitsPut);
        s.add(Stat::TimePut, 1500);

        let snap = s.snapshot();
        assert_eq!(snap[Stat::HitsPut as usize], 2);
        assert_eq!(snap[Stat::TimePut as usize], 1500);
        assert_eq!(snap[Stat::HitsGet as usize], 0);
    }

    #[test]
    fn test_concurrent_increments() {
        use std::sync::Arc;
        let s = Arc::new(StatSet::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let s = s.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..1000 {
                    s.increment(Stat::HitsTotal);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(s.snapshot()[Stat::HitsTotal as usize], 8000);
    }
}
