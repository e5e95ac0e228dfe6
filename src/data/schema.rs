//! Fixed column schema for the bike-sharing data set

/// The target variable: bikes available at a station.
pub const BIKES: &str = "bikes";

/// Derived target variable: bikes divided by docks.
pub const BIKES_FRACTION: &str = "bikes_fraction";

/// Identifier column carried by test tables and submissions.
pub const ID: &str = "id";

/// Station identifier column.
pub const STATION: &str = "station";

/// Total docks at a station, used to de-normalise the fraction target.
pub const DOCKS: &str = "docks";

/// Default station band for per-station experiments (inclusive).
pub const STATION_MIN: u32 = 201;
pub const STATION_MAX: u32 = 275;

/// Feature columns shared by train and test tables, in file order.
pub const FEATURES: [&str; 24] = [
    "station",
    "latitude",
    "longitude",
    "docks",
    "timestamp",
    "year",
    "month",
    "day",
    "hour",
    "weekday",
    "weekhour",
    "is_holiday",
    "wind_speed_max",
    "wind_speed_avg",
    "wind_direction",
    "temperature",
    "humidity",
    "pressure",
    "precipitation",
    "bikes_3h",
    "bikes_3h_diff_avg_full",
    "bikes_avg_full",
    "bikes_3h_diff_avg_short",
    "bikes_avg_short",
];
