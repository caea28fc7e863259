//! Row types for reading imported feed data back out.

use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Agency {
    pub id: i64,
    pub agency_entry_id: i64,
    pub agency_id: String,
    pub agency_name: String,
    pub agency_url: String,
    pub agency_timezone: String,
    pub agency_lang: Option<String>,
    pub agency_phone: Option<String>,
    pub agency_fare_url: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Stop {
    pub id: i64,
    pub agency_entry_id: i64,
    pub stop_id: String,
    pub stop_code: Option<String>,
    pub stop_name: String,
    pub stop_desc: Option<String>,
    pub stop_lat: f64,
    pub stop_lon: f64,
    pub zone_id: Option<String>,
    pub stop_url: Option<String>,
    pub location_type: Option<i32>,
    pub parent_station: Option<String>,
    pub stop_timezone: Option<String>,
    pub wheelchair_boarding: Option<i32>,
    pub platform_code: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Route {
    pub id: i64,
    pub agency_entry_id: i64,
    pub route_id: Option<String>,
    pub agency_id: Option<i64>,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_desc: Option<String>,
    pub route_type: i32,
    pub route_url: Option<String>,
    pub route_color: Option<String>,
    pub route_text_color: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trip {
    pub id: i64,
    pub agency_entry_id: i64,
    pub trip_id: String,
    pub route_id: i64,
    pub service_id: i64,
    pub trip_headsign: Option<String>,
    pub trip_short_name: Option<String>,
    pub direction_id: Option<i32>,
    pub block_id: Option<String>,
    pub shape_id: Option<i64>,
    pub wheelchair_accessible: Option<i32>,
    pub bikes_allowed: Option<i32>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShapePoint {
    pub shape_id: i64,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: i32,
    pub shape_dist_traveled: Option<f64>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StopTime {
    pub id: i64,
    pub agency_entry_id: i64,
    pub trip_id: i64,
    pub stop_id: i64,
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_sequence: Option<i32>,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<i32>,
    pub drop_off_type: Option<i32>,
    pub shape_dist_traveled: Option<f64>,
    pub timepoint: Option<i32>,
}
