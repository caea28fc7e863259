//! Read-back queries over imported feed data.
//!
//! These operate on the current generation of an agency, looked up by its
//! agency key. They exist for consumers of the imported data and for
//! verifying an import end to end.

use crate::error::ImportError;
use crate::models::{Agency, Route, ShapePoint, Stop, StopTime, Trip};
use sqlx::PgPool;

/// The surrogate id of the live generation for `agency_key`, if one exists.
pub async fn current_generation(
    pool: &PgPool,
    agency_key: &str,
) -> Result<Option<i64>, ImportError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM agency_entry WHERE agency_key = $1")
        .bind(agency_key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(id,)| id))
}

pub async fn get_agencies(pool: &PgPool, entry_id: i64) -> Result<Vec<Agency>, ImportError> {
    let agencies = sqlx::query_as(
        r#"SELECT id, agency_entry_id, agency_id, agency_name, agency_url, agency_timezone, agency_lang, agency_phone, agency_fare_url
           FROM agency WHERE agency_entry_id = $1 ORDER BY agency_id"#,
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await?;
    Ok(agencies)
}

pub async fn get_stops(pool: &PgPool, entry_id: i64) -> Result<Vec<Stop>, ImportError> {
    let stops = sqlx::query_as(
        r#"SELECT id, agency_entry_id, stop_id, stop_code, stop_name, stop_desc, stop_lat, stop_lon, zone_id, stop_url, location_type, parent_station, stop_timezone, wheelchair_boarding, platform_code
           FROM stop WHERE agency_entry_id = $1 ORDER BY stop_id"#,
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await?;
    Ok(stops)
}

pub async fn get_routes(pool: &PgPool, entry_id: i64) -> Result<Vec<Route>, ImportError> {
    let routes = sqlx::query_as(
        r#"SELECT id, agency_entry_id, route_id, agency_id, route_short_name, route_long_name, route_desc, route_type, route_url, route_color, route_text_color
           FROM route WHERE agency_entry_id = $1 ORDER BY route_id"#,
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await?;
    Ok(routes)
}

pub async fn get_trips(pool: &PgPool, entry_id: i64) -> Result<Vec<Trip>, ImportError> {
    let trips = sqlx::query_as(
        r#"SELECT id, agency_entry_id, trip_id, route_id, service_id, trip_headsign, trip_short_name, direction_id, block_id, shape_id, wheelchair_accessible, bikes_allowed
           FROM trip WHERE agency_entry_id = $1 ORDER BY trip_id"#,
    )
    .bind(entry_id)
    .fetch_all(pool)
    .await?;
    Ok(trips)
}

/// Points of one shape in stored sequence order.
pub async fn get_shape_points(pool: &PgPool, shape_id: i64) -> Result<Vec<ShapePoint>, ImportError> {
    let points = sqlx::query_as(
        r#"SELECT shape_id, shape_pt_lat, shape_pt_lon, shape_pt_sequence, shape_dist_traveled
           FROM shape_sequence WHERE shape_id = $1 ORDER BY shape_pt_sequence"#,
    )
    .bind(shape_id)
    .fetch_all(pool)
    .await?;
    Ok(points)
}

/// Stop times of one trip in stop sequence order.
pub async fn get_stop_times(pool: &PgPool, trip_id: i64) -> Result<Vec<StopTime>, ImportError> {
    let stop_times = sqlx::query_as(
        r#"SELECT id, agency_entry_id, trip_id, stop_id, arrival_time, departure_time, stop_sequence, stop_headsign, pickup_type, drop_off_type, shape_dist_traveled, timepoint
           FROM stop_time WHERE trip_id = $1 ORDER BY stop_sequence"#,
    )
    .bind(trip_id)
    .fetch_all(pool)
    .await?;
    Ok(stop_times)
}
