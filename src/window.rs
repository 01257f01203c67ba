//! Okna czasowe (gildia, aktor, rodzaj sygnału) -> znaczniki czasu.
//!
//! Przycinanie jest leniwe: przy każdym zapisie i odczycie, bez sprzątania w tle.
//! Zdarzenia mogą przyjść nie po kolei (osobne taski, opóźnienie korelatora), więc wpis
//! trafia na swoje miejsce w kolejce, a przycinanie liczy od najnowszego znanego znacznika.
//! Cała sekwencja przytnij-dopisz-sprawdź-wyczyść dzieje się pod blokadą wpisu DashMapy,
//! więc zdarzenia jednego klucza nie gubią się nawzajem.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::WindowRule;
use crate::model::SignalKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub guild_id: u64,
    pub actor_id: u64,
    pub kind: SignalKind,
}

impl WindowKey {
    pub fn new(guild_id: u64, actor_id: u64, kind: SignalKind) -> Self {
        Self { guild_id, actor_id, kind }
    }
}

/// Okno z dodatkowym ładunkiem przy każdym wpisie (np. referencją do wiadomości).
pub struct WindowTracker<T = ()> {
    window: Duration,
    capacity: Option<usize>,
    entries: DashMap<WindowKey, VecDeque<(DateTime<Utc>, T)>>,
}

impl<T: Clone> WindowTracker<T> {
    pub fn new(rule: WindowRule) -> Self {
        Self {
            window: Duration::seconds(rule.window_seconds as i64),
            capacity: rule.capacity.filter(|c| *c > 0),
            entries: DashMap::new(),
        }
    }

    /// Dopisuje zdarzenie i zwraca liczbę wpisów w oknie po przycięciu.
    pub fn record(&self, key: WindowKey, at: DateTime<Utc>, item: T) -> usize {
        let mut q = self.entries.entry(key).or_default();
        self.admit(&mut q, at, item);
        q.len()
    }

    /// Dopisuje zdarzenie; jeśli okno osiągnęło `threshold`, opróżnia je atomowo
    /// i oddaje wszystkie zatrzymane wpisy (najstarszy pierwszy).
    pub fn record_and_drain(
        &self,
        key: WindowKey,
        at: DateTime<Utc>,
        item: T,
        threshold: u32,
    ) -> Option<Vec<(DateTime<Utc>, T)>> {
        let drained = {
            let mut q = self.entries.entry(key).or_default();
            self.admit(&mut q, at, item);
            if q.len() >= threshold.max(1) as usize {
                Some(q.drain(..).collect::<Vec<_>>())
            } else {
                None
            }
        };
        if drained.is_some() {
            self.entries.remove_if(&key, |_, q| q.is_empty());
        }
        drained
    }

    pub fn clear(&self, key: &WindowKey) {
        self.entries.remove(key);
    }

    /// Znaczniki czasu zatrzymane w oknie na chwilę `now` (najstarszy pierwszy).
    pub fn peek(&self, key: &WindowKey, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.peek_entries(key, now).into_iter().map(|(t, _)| t).collect()
    }

    pub fn peek_entries(&self, key: &WindowKey, now: DateTime<Utc>) -> Vec<(DateTime<Utc>, T)> {
        let out = match self.entries.get_mut(key) {
            Some(mut q) => {
                self.prune(&mut q, now);
                q.iter().cloned().collect::<Vec<_>>()
            }
            None => return Vec::new(),
        };
        if out.is_empty() {
            self.entries.remove_if(key, |_, q| q.is_empty());
        }
        out
    }

    /// Liczba aktywnych kluczy.
    pub fn tracked_keys(&self) -> usize {
        self.entries.len()
    }

    /// Wstawia wpis w kolejności czasu i przycina względem najnowszego wpisu.
    fn admit(&self, q: &mut VecDeque<(DateTime<Utc>, T)>, at: DateTime<Utc>, item: T) {
        let pos = q.partition_point(|(t, _)| *t <= at);
        q.insert(pos, (at, item));
        if let Some(newest) = q.back().map(|(t, _)| *t) {
            self.prune(q, newest);
        }
        self.cap(q);
    }

    /// Kolejka jest posortowana, więc wystarczy zdejmować z przodu.
    fn prune(&self, q: &mut VecDeque<(DateTime<Utc>, T)>, now: DateTime<Utc>) {
        // granica włącznie: now - t == window zostaje
        while let Some((front, _)) = q.front() {
            if now - *front > self.window {
                q.pop_front();
            } else {
                break;
            }
        }
    }

    fn cap(&self, q: &mut VecDeque<(DateTime<Utc>, T)>) {
        if let Some(cap) = self.capacity {
            while q.len() > cap {
                q.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn key() -> WindowKey {
        WindowKey::new(1, 2, SignalKind::Invite)
    }

    #[test]
    fn boundary_is_inclusive() {
        let w: WindowTracker = WindowTracker::new(WindowRule::new(10, 45));
        w.record(key(), t0(), ());
        assert_eq!(w.peek(&key(), t0() + Duration::seconds(45)), vec![t0()]);
        assert!(w.peek(&key(), t0() + Duration::seconds(46)).is_empty());
        assert_eq!(w.tracked_keys(), 0);
    }

    #[test]
    fn capacity_drops_oldest_first() {
        let mut rule = WindowRule::new(10, 60);
        rule.capacity = Some(2);
        let w: WindowTracker<u32> = WindowTracker::new(rule);
        for i in 0..4 {
            w.record(key(), t0() + Duration::seconds(i), i as u32);
        }
        let items: Vec<u32> = w
            .peek_entries(&key(), t0() + Duration::seconds(4))
            .into_iter()
            .map(|(_, i)| i)
            .collect();
        assert_eq!(items, vec![2, 3]);
    }

    #[test]
    fn drain_fires_once_then_restarts_from_zero() {
        let w: WindowTracker<u64> = WindowTracker::new(WindowRule::new(3, 45));
        assert!(w.record_and_drain(key(), t0(), 10, 3).is_none());
        assert!(w.record_and_drain(key(), t0() + Duration::seconds(1), 11, 3).is_none());
        let fired = w
            .record_and_drain(key(), t0() + Duration::seconds(2), 12, 3)
            .expect("third event fires");
        assert_eq!(fired.iter().map(|(_, m)| *m).collect::<Vec<_>>(), vec![10, 11, 12]);
        assert!(w.peek(&key(), t0() + Duration::seconds(2)).is_empty());
        assert_eq!(w.record(key(), t0() + Duration::seconds(3), 13), 1);
    }

    #[test]
    fn keys_do_not_share_state() {
        let w: WindowTracker = WindowTracker::new(WindowRule::new(3, 45));
        w.record(key(), t0(), ());
        w.record(WindowKey::new(1, 2, SignalKind::Mention), t0(), ());
        w.record(WindowKey::new(9, 2, SignalKind::Invite), t0(), ());
        assert_eq!(w.record(key(), t0(), ()), 2);
        w.clear(&key());
        assert_eq!(w.tracked_keys(), 2);
    }

    #[test]
    fn late_event_does_not_hide_expired_entries() {
        let w: WindowTracker = WindowTracker::new(WindowRule::new(10, 5));
        w.record(key(), t0() + Duration::seconds(10), ());
        // spóźnione zdarzenie sprzed okna najnowszego wpisu od razu wypada
        assert_eq!(w.record(key(), t0(), ()), 1);
        assert_eq!(
            w.peek(&key(), t0() + Duration::seconds(12)),
            vec![t0() + Duration::seconds(10)]
        );
    }

    #[test]
    fn late_event_inside_window_lands_in_order() {
        let w: WindowTracker<u32> = WindowTracker::new(WindowRule::new(3, 30));
        assert!(w.record_and_drain(key(), t0() + Duration::seconds(10), 2, 3).is_none());
        assert!(w.record_and_drain(key(), t0() + Duration::seconds(20), 3, 3).is_none());
        let fired = w
            .record_and_drain(key(), t0() + Duration::seconds(5), 1, 3)
            .expect("three events within 30 s");
        assert_eq!(fired.iter().map(|(_, i)| *i).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    proptest! {
        #[test]
        fn retained_iff_within_window(
            offsets in proptest::collection::vec(0i64..200, 1..40),
            window in 1u64..120,
            probe in 0i64..400,
        ) {
            let w: WindowTracker = WindowTracker::new(WindowRule::new(u32::MAX, window));
            // kolejność zapisów dowolna, tak jak przychodzą z osobnych tasków
            for off in &offsets {
                w.record(key(), t0() + Duration::seconds(*off), ());
            }
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            let last = *sorted.last().unwrap();
            let now = t0() + Duration::seconds(last.max(probe));
            let expected: Vec<_> = sorted
                .iter()
                .map(|off| t0() + Duration::seconds(*off))
                .filter(|t| now - *t <= Duration::seconds(window as i64))
                .collect();
            // zapisy przycinały po drodze, ale nigdy nie wyrzuciły niczego, co jest w oknie `now`
            prop_assert_eq!(w.peek(&key(), now), expected);
        }
    }
}
