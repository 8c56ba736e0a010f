//! Daily quest rotation.
//!
//! The active quests are a pure function of the calendar day, so every
//! server instance agrees on them without sharing any state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Quest {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub points: i64,
}

/// How many quests are active on a given day.
pub const DAILY_QUESTS: usize = 3;

const SECONDS_PER_DAY: i64 = 86_400;

pub const QUEST_POOL: &[Quest] = &[
    Quest {
        id: "pick-litter",
        title: "Pick up 5 pieces of litter",
        description: "Upload a photo of trash you removed from campus or your neighborhood.",
        points: 10,
    },
    Quest {
        id: "reusable-bottle",
        title: "Bring a reusable bottle",
        description: "Show your reusable water bottle or mug instead of a single-use plastic bottle.",
        points: 5,
    },
    Quest {
        id: "green-innovation",
        title: "Spot a green innovation",
        description: "Share a picture of an eco-friendly feature (solar panels, refill station, bike racks, etc.).",
        points: 5,
    },
    Quest {
        id: "before-after-cleanup",
        title: "Before & after cleanup",
        description: "Take a before and after photo of an area you cleaned or organized.",
        points: 50,
    },
    Quest {
        id: "plant-care",
        title: "Care for a plant",
        description: "Show yourself watering, repotting, or tending to a plant or garden.",
        points: 10,
    },
    Quest {
        id: "recycling-check",
        title: "Check recycling labels",
        description: "Take a photo of you correctly sorting items into recycling / compost / trash.",
        points: 20,
    },
];

pub fn find_quest(id: &str) -> Option<&'static Quest> {
    QUEST_POOL.iter().find(|q| q.id == id)
}

/// Points a quest tag is worth; unknown or absent tags are worth nothing.
pub fn reward_for(quest_id: Option<&str>) -> i64 {
    quest_id.and_then(find_quest).map(|q| q.points).unwrap_or(0)
}

pub fn today_quests(now: DateTime<Utc>) -> Vec<Quest> {
    rotation(QUEST_POOL, now)
}

fn rotation(pool: &[Quest], now: DateTime<Utc>) -> Vec<Quest> {
    if pool.is_empty() {
        return Vec::new();
    }
    let day_index = now.timestamp().div_euclid(SECONDS_PER_DAY);
    let start = day_index.rem_euclid(pool.len() as i64) as usize;
    (0..DAILY_QUESTS.min(pool.len()))
        .map(|i| pool[(start + i) % pool.len()])
        .collect()
}
