//! Timeline column schema and per-field join policies
//!
//! Every persisted column is listed here exactly once, together with how the
//! timeline builder aligns it onto the base location samples and how the
//! playback resampler fills it between observations. Keeping this table in
//! one place is what makes the merge auditable.

/// How a field is attached to the base (location) sample sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// The join key itself (elapsed offset)
    Key,
    /// Taken directly from the base location sample
    Base,
    /// Nearest-in-time source record, either direction
    Nearest,
    /// Most recent source record at or before the base timestamp
    Backward,
    /// Exact match on the lap number, not on time
    ExactKey,
}

/// How the playback resampler fills a field between observations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillClass {
    /// Linearly interpolated against the timestamp axis
    Continuous,
    /// Last known value carried forward (then backward before the first)
    Discrete,
}

/// Value domain used when filling missing cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Categorical,
    /// Numeric or textual depending on the data (gap fields may read `+1 LAP`)
    Mixed,
}

/// Timeline columns in persisted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    TimeOffset,
    DriverNumber,
    X,
    Y,
    Speed,
    Rpm,
    Gear,
    Throttle,
    Brake,
    Drs,
    GapToLeader,
    Interval,
    Position,
    LapNumber,
    Sector1,
    Sector2,
    Sector3,
    LapTime,
    Compound,
    TyreAge,
}

impl Field {
    pub const ALL: [Field; 20] = [
        Field::TimeOffset,
        Field::DriverNumber,
        Field::X,
        Field::Y,
        Field::Speed,
        Field::Rpm,
        Field::Gear,
        Field::Throttle,
        Field::Brake,
        Field::Drs,
        Field::GapToLeader,
        Field::Interval,
        Field::Position,
        Field::LapNumber,
        Field::Sector1,
        Field::Sector2,
        Field::Sector3,
        Field::LapTime,
        Field::Compound,
        Field::TyreAge,
    ];

    /// Column header
    pub fn name(&self) -> &'static str {
        match self {
            Field::TimeOffset => "time_offset",
            Field::DriverNumber => "driver_number",
            Field::X => "x",
            Field::Y => "y",
            Field::Speed => "speed",
            Field::Rpm => "rpm",
            Field::Gear => "n_gear",
            Field::Throttle => "throttle",
            Field::Brake => "brake",
            Field::Drs => "drs",
            Field::GapToLeader => "gap_to_leader",
            Field::Interval => "interval",
            Field::Position => "position",
            Field::LapNumber => "lap_number",
            Field::Sector1 => "sector_1",
            Field::Sector2 => "sector_2",
            Field::Sector3 => "sector_3",
            Field::LapTime => "lap_time",
            Field::Compound => "compound",
            Field::TyreAge => "tyre_age",
        }
    }

    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.name() == name)
    }

    pub fn join_policy(&self) -> JoinPolicy {
        match self {
            Field::TimeOffset => JoinPolicy::Key,
            Field::DriverNumber | Field::X | Field::Y => JoinPolicy::Base,
            Field::Speed
            | Field::Rpm
            | Field::Gear
            | Field::Throttle
            | Field::Brake
            | Field::Drs => JoinPolicy::Nearest,
            Field::GapToLeader
            | Field::Interval
            | Field::Position
            | Field::LapNumber
            | Field::Sector1
            | Field::Sector2
            | Field::Sector3
            | Field::LapTime => JoinPolicy::Backward,
            Field::Compound | Field::TyreAge => JoinPolicy::ExactKey,
        }
    }

    pub fn fill_class(&self) -> FillClass {
        match self {
            Field::X | Field::Y => FillClass::Continuous,
            _ => FillClass::Discrete,
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            Field::Compound => ValueKind::Categorical,
            Field::GapToLeader | Field::Interval => ValueKind::Mixed,
            _ => ValueKind::Numeric,
        }
    }
}

/// Fill class for an arbitrary column header; unknown columns are discrete
pub fn fill_class_of(name: &str) -> FillClass {
    Field::from_name(name)
        .map(|f| f.fill_class())
        .unwrap_or(FillClass::Discrete)
}
