//! Duty categories and the seats that make up each of them.
//!
//! The staffing model is closed: four categories whose headcounts sum to the
//! team size, each split into an ordered list of sub-positions. The three
//! night categories carry exactly one lead seat.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of people on a team.
pub const TEAM_SIZE: usize = 17;

/// Number of lead-qualified people on a team.
pub const LEAD_COUNT: usize = 6;

/// Consecutive work days inspected by the night-load rule.
pub const NIGHT_WINDOW_DAYS: usize = 4;

/// Maximum night duties inside one night-load window.
pub const NIGHT_WINDOW_MAX: i32 = 3;

/// Errors raised when parsing wire names.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Unknown duty category: {0}")]
    UnknownCategory(String),
    #[error("Unknown sub-position: {0}")]
    UnknownSubPosition(String),
}

/// One of the four mutually exclusive daily duties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DutyCategory {
    Day,
    Sleep,
    ShortNight,
    SeniorNight,
}

impl DutyCategory {
    pub const COUNT: usize = 4;

    pub const ALL: [DutyCategory; 4] = [
        DutyCategory::Day,
        DutyCategory::Sleep,
        DutyCategory::ShortNight,
        DutyCategory::SeniorNight,
    ];

    /// Categories that need a lead-of-record every day.
    pub const LEAD_ELIGIBLE: [DutyCategory; 3] = [
        DutyCategory::Sleep,
        DutyCategory::ShortNight,
        DutyCategory::SeniorNight,
    ];

    /// Categories counted by the night-load rule.
    pub const NIGHTS: [DutyCategory; 3] = Self::LEAD_ELIGIBLE;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Required number of people in this category on every work day.
    pub fn headcount(self) -> i32 {
        match self {
            DutyCategory::Day => 6,
            DutyCategory::Sleep => 5,
            DutyCategory::ShortNight => 3,
            DutyCategory::SeniorNight => 3,
        }
    }

    pub fn is_night(self) -> bool {
        !matches!(self, DutyCategory::Day)
    }

    pub fn is_lead_eligible(self) -> bool {
        self.lead_seat().is_some()
    }

    /// The seat reserved for the lead-of-record, if the category has one.
    pub fn lead_seat(self) -> Option<SubPosition> {
        self.slots()
            .iter()
            .find(|slot| slot.requires_lead)
            .map(|slot| slot.position)
    }

    /// Ordered seats of this category.
    pub fn slots(self) -> &'static [SlotSpec] {
        match self {
            DutyCategory::Day => &DAY_SLOTS,
            DutyCategory::Sleep => &SLEEP_SLOTS,
            DutyCategory::ShortNight => &SHORT_NIGHT_SLOTS,
            DutyCategory::SeniorNight => &SENIOR_NIGHT_SLOTS,
        }
    }

    /// Wire name shared with the Python service.
    pub fn as_str(self) -> &'static str {
        match self {
            DutyCategory::Day => "DAY",
            DutyCategory::Sleep => "SLEEP",
            DutyCategory::ShortNight => "MINI_NIGHT",
            DutyCategory::SeniorNight => "LATE_NIGHT",
        }
    }
}

impl fmt::Display for DutyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DutyCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAY" => Ok(DutyCategory::Day),
            "SLEEP" => Ok(DutyCategory::Sleep),
            "MINI_NIGHT" | "SHORT_NIGHT" => Ok(DutyCategory::ShortNight),
            "LATE_NIGHT" | "SENIOR_NIGHT" => Ok(DutyCategory::SeniorNight),
            _ => Err(CatalogError::UnknownCategory(s.to_string())),
        }
    }
}

/// A named seat within a duty category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubPosition {
    DayRegular,
    SleepLead,
    SleepNorthwest,
    SleepSoutheast,
    ShortNightLead,
    ShortNightRegular,
    SeniorNightLead,
    SeniorNightRegular,
}

impl SubPosition {
    const ALL: [SubPosition; 8] = [
        SubPosition::DayRegular,
        SubPosition::SleepLead,
        SubPosition::SleepNorthwest,
        SubPosition::SleepSoutheast,
        SubPosition::ShortNightLead,
        SubPosition::ShortNightRegular,
        SubPosition::SeniorNightLead,
        SubPosition::SeniorNightRegular,
    ];

    pub fn category(self) -> DutyCategory {
        match self {
            SubPosition::DayRegular => DutyCategory::Day,
            SubPosition::SleepLead | SubPosition::SleepNorthwest | SubPosition::SleepSoutheast => {
                DutyCategory::Sleep
            }
            SubPosition::ShortNightLead | SubPosition::ShortNightRegular => {
                DutyCategory::ShortNight
            }
            SubPosition::SeniorNightLead | SubPosition::SeniorNightRegular => {
                DutyCategory::SeniorNight
            }
        }
    }

    pub fn is_lead_seat(self) -> bool {
        matches!(
            self,
            SubPosition::SleepLead | SubPosition::ShortNightLead | SubPosition::SeniorNightLead
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubPosition::DayRegular => "DAY_REGULAR",
            SubPosition::SleepLead => "SLEEP_LEAD",
            SubPosition::SleepNorthwest => "SLEEP_NORTHWEST",
            SubPosition::SleepSoutheast => "SLEEP_SOUTHEAST",
            SubPosition::ShortNightLead => "MINI_NIGHT_LEAD",
            SubPosition::ShortNightRegular => "MINI_NIGHT_REGULAR",
            SubPosition::SeniorNightLead => "LATE_NIGHT_LEAD",
            SubPosition::SeniorNightRegular => "LATE_NIGHT_REGULAR",
        }
    }
}

impl fmt::Display for SubPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubPosition {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|position| position.as_str() == wanted)
            .ok_or_else(|| CatalogError::UnknownSubPosition(s.to_string()))
    }
}

/// One entry of a category's seat list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotSpec {
    pub position: SubPosition,
    pub count: usize,
    pub requires_lead: bool,
}

const fn slot(position: SubPosition, count: usize, requires_lead: bool) -> SlotSpec {
    SlotSpec {
        position,
        count,
        requires_lead,
    }
}

static DAY_SLOTS: [SlotSpec; 1] = [slot(SubPosition::DayRegular, 6, false)];

static SLEEP_SLOTS: [SlotSpec; 3] = [
    slot(SubPosition::SleepLead, 1, true),
    slot(SubPosition::SleepNorthwest, 2, false),
    slot(SubPosition::SleepSoutheast, 2, false),
];

static SHORT_NIGHT_SLOTS: [SlotSpec; 2] = [
    slot(SubPosition::ShortNightLead, 1, true),
    slot(SubPosition::ShortNightRegular, 2, false),
];

static SENIOR_NIGHT_SLOTS: [SlotSpec; 2] = [
    slot(SubPosition::SeniorNightLead, 1, true),
    slot(SubPosition::SeniorNightRegular, 2, false),
];

/// Per-category counters indexed by `DutyCategory`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryCounts(pub [u32; DutyCategory::COUNT]);

impl CategoryCounts {
    pub fn get(&self, category: DutyCategory) -> u32 {
        self.0[category.index()]
    }

    pub fn increment(&mut self, category: DutyCategory) {
        self.0[category.index()] += 1;
    }
}

impl std::ops::Add for CategoryCounts {
    type Output = CategoryCounts;

    fn add(self, rhs: CategoryCounts) -> CategoryCounts {
        let mut out = self;
        for (slot, extra) in out.0.iter_mut().zip(rhs.0) {
            *slot += extra;
        }
        out
    }
}
