use super::value::Value;
use crate::core::types::SimTime;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub datetime: NaiveDateTime,
    pub sim_time: SimTime,
    pub entity: String,
    pub key: String,
    pub value: Value,
}

/// Append-only record of every observed attribute
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    /// Values kept per `(entity, key)`; `None` keeps everything
    retention: Option<usize>,
    series: BTreeMap<(String, String), VecDeque<(SimTime, NaiveDateTime, Value)>>,
}

impl TimeSeries {
    pub fn new(retention: Option<usize>) -> Self {
        Self {
            retention,
            series: BTreeMap::new(),
        }
    }

    pub fn retention(&self) -> Option<usize> {
        self.retention
    }

    pub fn record(
        &mut self,
        sim_time: SimTime,
        datetime: NaiveDateTime,
        entity: &str,
        key: &str,
        value: Value,
    ) {
        let series = self
            .series
            .entry((entity.to_string(), key.to_string()))
            .or_default();
        series.push_back((sim_time, datetime, value));
        if let Some(limit) = self.retention {
            while series.len() > limit {
                series.pop_front();
            }
        }
    }

    /// `(entity, key)` pairs seen so far
    pub fn keys(&self) -> impl Iterator<Item = (&str, &str)> {
        self.series.keys().map(|(e, k)| (e.as_str(), k.as_str()))
    }

    /// Values of one attribute, oldest first
    pub fn values(&self, entity: &str, key: &str) -> Vec<(SimTime, &Value)> {
        self.series
            .get(&(entity.to_string(), key.to_string()))
            .map(|s| s.iter().map(|(t, _, v)| (*t, v)).collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, entity: &str, key: &str) -> Option<&Value> {
        self.series
            .get(&(entity.to_string(), key.to_string()))
            .and_then(|s| s.back())
            .map(|(_, _, v)| v)
    }

    /// Every retained observation, ordered by time then entity and key
    pub fn rows(&self) -> Vec<Observation> {
        let mut rows: Vec<Observation> = self
            .series
            .iter()
            .flat_map(|((entity, key), values)| {
                values.iter().map(move |(sim_time, datetime, value)| Observation {
                    datetime: *datetime,
                    sim_time: *sim_time,
                    entity: entity.clone(),
                    key: key.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.sim_time
                .cmp(&b.sim_time)
                .then_with(|| a.entity.cmp(&b.entity))
                .then_with(|| a.key.cmp(&b.key))
        });
        rows
    }

    pub fn len(&self) -> usize {
        self.series.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
