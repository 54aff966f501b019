//! Aggregate statistics over the merged result set.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::skills::split_skills;
use crate::pipeline::merge::MergedResultSet;

pub const TOP_SKILLS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillCount {
    pub skill: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SkillStatistics {
    pub total_rows: usize,
    pub with_both: usize,
    pub hard_only: usize,
    pub soft_only: usize,
    pub with_neither: usize,
    pub distinct_hard: usize,
    pub distinct_soft: usize,
    pub top_hard: Vec<SkillCount>,
    pub top_soft: Vec<SkillCount>,
}

impl SkillStatistics {
    pub fn from_merged(merged: &MergedResultSet) -> Self {
        let mut stats = Self {
            total_rows: merged.len(),
            ..Self::default()
        };
        let mut hard_counts: HashMap<String, usize> = HashMap::new();
        let mut soft_counts: HashMap<String, usize> = HashMap::new();

        for row in &merged.rows {
            let hard = split_skills(&row.hard_skills);
            let soft = split_skills(&row.soft_skills);

            match (hard.is_empty(), soft.is_empty()) {
                (false, false) => stats.with_both += 1,
                (false, true) => stats.hard_only += 1,
                (true, false) => stats.soft_only += 1,
                (true, true) => stats.with_neither += 1,
            }

            for skill in hard {
                *hard_counts.entry(skill).or_default() += 1;
            }
            for skill in soft {
                *soft_counts.entry(skill).or_default() += 1;
            }
        }

        stats.distinct_hard = hard_counts.len();
        stats.distinct_soft = soft_counts.len();
        stats.top_hard = top_n(hard_counts, TOP_SKILLS);
        stats.top_soft = top_n(soft_counts, TOP_SKILLS);
        stats
    }

    /// Share of rows with both categories, in percent.
    pub fn completeness(&self) -> f64 {
        if self.total_rows == 0 {
            return 0.0;
        }
        self.with_both as f64 * 100.0 / self.total_rows as f64
    }
}

/// Most frequent first; equal counts in alphabetical order.
fn top_n(counts: HashMap<String, usize>, n: usize) -> Vec<SkillCount> {
    let mut ranked: Vec<SkillCount> = counts
        .into_iter()
        .map(|(skill, count)| SkillCount { skill, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.skill.cmp(&b.skill)));
    ranked.truncate(n);
    ranked
}
