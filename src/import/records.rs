//! Typed records for each feed file.
//!
//! Fields are deserialized straight from the header-driven CSV rows. Blank
//! or unparseable numeric and date fields become `None` rather than zero, so
//! absent data stays absent in storage. Times of day stay raw strings
//! because GTFS allows values past `24:00:00`.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// Feed dates are `YYYYMMDD`.
const DATE_FORMAT: &str = "%Y%m%d";

fn de_opt_string<'de, D: Deserializer<'de>>(de: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(de)?;
    Ok(value.filter(|s| !s.trim().is_empty()).map(|s| s.trim().to_string()))
}

fn de_opt_i32<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i32>, D::Error> {
    let value = Option::<String>::deserialize(de)?;
    Ok(value.and_then(|s| s.trim().parse().ok()))
}

fn de_opt_f64<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<String>::deserialize(de)?;
    Ok(value.and_then(|s| s.trim().parse().ok()))
}

fn de_opt_date<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
    let value = Option::<String>::deserialize(de)?;
    Ok(value.and_then(|s| NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgencyRecord {
    #[serde(default, deserialize_with = "de_opt_string")]
    pub agency_id: Option<String>,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub agency_lang: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub agency_phone: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub agency_fare_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarRecord {
    pub service_id: String,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub monday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub tuesday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub wednesday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub thursday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub friday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub saturday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub sunday: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarDateRecord {
    pub service_id: String,
    #[serde(default, deserialize_with = "de_opt_date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub exception_type: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopRecord {
    pub stop_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stop_code: Option<String>,
    #[serde(default)]
    pub stop_name: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stop_desc: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub stop_lat: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub stop_lon: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub zone_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stop_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub location_type: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub parent_station: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stop_timezone: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub wheelchair_boarding: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub platform_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub route_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub route_short_name: String,
    #[serde(default)]
    pub route_long_name: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub route_desc: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub route_type: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub route_url: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub route_color: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub route_text_color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeRecord {
    pub shape_id: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub shape_pt_lat: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub shape_pt_lon: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub shape_pt_sequence: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub shape_dist_traveled: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripRecord {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub trip_headsign: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub trip_short_name: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub direction_id: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub block_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub shape_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub wheelchair_accessible: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub bikes_allowed: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    // Raw time-of-day strings; may exceed 24:00:00 and are not reformatted.
    #[serde(default, deserialize_with = "de_opt_string")]
    pub arrival_time: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub departure_time: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub stop_sequence: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub stop_headsign: Option<String>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub pickup_type: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub drop_off_type: Option<i32>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    pub shape_dist_traveled: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_i32")]
    pub timepoint: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one<R: serde::de::DeserializeOwned>(csv_text: &str) -> R {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());
        reader
            .deserialize()
            .next()
            .expect("one record")
            .expect("valid record")
    }

    #[test]
    fn blank_numeric_fields_become_none() {
        let record: StopTimeRecord =
            parse_one("trip_id,stop_id,stop_sequence,pickup_type\nT1,S1,,garbage\n");

        assert_eq!(record.stop_sequence, None);
        assert_eq!(record.pickup_type, None);
    }

    #[test]
    fn dates_parse_from_yyyymmdd() {
        let record: CalendarDateRecord =
            parse_one("service_id,date,exception_type\nS1,20160831,1\n");

        assert_eq!(record.date, Some(NaiveDate::from_ymd_opt(2016, 8, 31).unwrap()));
        assert_eq!(record.exception_type, Some(1));
    }

    #[test]
    fn malformed_date_becomes_none() {
        let record: CalendarDateRecord = parse_one("service_id,date,exception_type\nS1,2016,1\n");
        assert_eq!(record.date, None);
    }

    #[test]
    fn missing_optional_columns_are_tolerated() {
        let record: TripRecord = parse_one("trip_id,route_id,service_id\nT1,R1,S1\n");

        assert_eq!(record.trip_id, "T1");
        assert_eq!(record.shape_id, None);
        assert_eq!(record.direction_id, None);
    }

    #[test]
    fn blank_shape_id_on_trip_is_none() {
        let record: TripRecord =
            parse_one("trip_id,route_id,service_id,shape_id\nT1,R1,S1,\n");
        assert_eq!(record.shape_id, None);
    }

    #[test]
    fn times_stay_raw_strings() {
        let record: StopTimeRecord =
            parse_one("trip_id,stop_id,arrival_time,departure_time\nT1,S1,25:10:00,25:12:00\n");

        assert_eq!(record.arrival_time.as_deref(), Some("25:10:00"));
        assert_eq!(record.departure_time.as_deref(), Some("25:12:00"));
    }
}
