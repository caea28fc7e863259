//! Per-agency import orchestration.
//!
//! [`FeedImporter::import_agency`] drives one agency through a single
//! transaction: remove the prior generation, create a fresh one, then run
//! the entity importers in dependency order (agency → calendar →
//! calendar_dates → stops → routes → shapes → trips → stop_times). Each
//! step must finish before the next starts because later files resolve
//! references produced by earlier ones. Any error rolls the whole
//! transaction back, leaving the previous generation untouched.

use crate::config::ImporterConfig;
use crate::error::ImportError;
use crate::import::reader::{FeedDirectory, FeedFile};
use crate::import::records::{
    AgencyRecord, CalendarDateRecord, CalendarRecord, RouteRecord, ShapeRecord, StopRecord,
    StopTimeRecord, TripRecord,
};
use crate::import::refs::{EntityKind, ReferenceCache};
use crate::import::shapes::group_by_shape;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};

/// Row counts for one committed agency import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportStats {
    pub agencies: usize,
    pub services: usize,
    pub calendars: usize,
    pub calendar_dates: usize,
    pub stops: usize,
    pub routes: usize,
    pub shapes: usize,
    pub shape_points: usize,
    pub trips: usize,
    pub stop_times: usize,
}

pub struct FeedImporter {
    pool: PgPool,
    config: ImporterConfig,
}

/// Calendar dates carry no time of day; they are stored at midnight UTC.
fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

async fn create_shape(
    tx: &mut Transaction<'_, Postgres>,
    entry_id: i64,
    shape_id: &str,
) -> Result<i64, ImportError> {
    sqlx::query_scalar("INSERT INTO shape (agency_entry_id, shape_id) VALUES ($1, $2) RETURNING id")
        .bind(entry_id)
        .bind(shape_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(ImportError::from_db)
}

impl FeedImporter {
    pub fn new(pool: PgPool, config: ImporterConfig) -> Self {
        Self { pool, config }
    }

    /// Import one agency's feed directory, replacing any prior generation.
    ///
    /// All writes happen inside a single transaction; on success exactly one
    /// live generation exists for the agency key, on failure the previous
    /// one (if any) is still intact.
    pub async fn import_agency(
        &self,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<ImportStats, ImportError> {
        let mut tx = self.pool.begin().await.map_err(ImportError::Transaction)?;
        let mut cache = ReferenceCache::new(self.config.single_agency_fallback);
        let mut stats = ImportStats::default();

        let outcome = self
            .run(&mut tx, &mut cache, &mut stats, agency_key, dir)
            .await;

        match outcome {
            Ok(()) => {
                tx.commit().await.map_err(ImportError::Transaction)?;
                log::info!(
                    "{}: committed {} stops, {} routes, {} trips, {} stop times",
                    agency_key,
                    stats.stops,
                    stats.routes,
                    stats.trips,
                    stats.stop_times
                );
                Ok(stats)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::error!("{}: rollback failed: {}", agency_key, rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        self.remove_prior_generation(tx, agency_key).await?;
        let entry_id = self.create_generation(tx, agency_key).await?;

        self.import_agencies(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_calendars(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_calendar_dates(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_stops(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_routes(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_shapes(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_trips(tx, cache, stats, entry_id, agency_key, dir)
            .await?;
        self.import_stop_times(tx, cache, stats, entry_id, agency_key, dir)
            .await?;

        Ok(())
    }

    /// Delete the prior generation for this agency key, if one exists.
    ///
    /// The largest tables are cleared explicitly first; deleting the
    /// `agency_entry` row cascades through whatever remains (agency,
    /// calendar, calendar_date, shape, shape_sequence).
    async fn remove_prior_generation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        agency_key: &str,
    ) -> Result<(), ImportError> {
        let prior: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM agency_entry WHERE agency_key = $1")
                .bind(agency_key)
                .fetch_optional(&mut **tx)
                .await?;

        let Some((entry_id,)) = prior else {
            log::info!("{}: no previous generation", agency_key);
            return Ok(());
        };

        log::info!("{}: removing previous generation {}", agency_key, entry_id);
        for table in ["stop_time", "stop", "trip", "route", "service"] {
            let query = format!("DELETE FROM {table} WHERE agency_entry_id = $1");
            let result = sqlx::query(&query)
                .bind(entry_id)
                .execute(&mut **tx)
                .await?;
            log::debug!(
                "{}: removed {} rows from {}",
                agency_key,
                result.rows_affected(),
                table
            );
        }

        sqlx::query("DELETE FROM agency_entry WHERE id = $1")
            .bind(entry_id)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    async fn create_generation(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        agency_key: &str,
    ) -> Result<i64, ImportError> {
        sqlx::query_scalar("INSERT INTO agency_entry (agency_key) VALUES ($1) RETURNING id")
            .bind(agency_key)
            .fetch_one(&mut **tx)
            .await
            .map_err(ImportError::from_db)
    }

    async fn import_agencies(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<AgencyRecord>(
            FeedFile::Agency,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading agency.txt", agency_key);

        let mut first_batch = true;
        while let Some(batch) = rx.recv().await {
            let batch = batch?;
            // A feed with a single agency may leave agency_id blank; the
            // agency key stands in so references still resolve.
            let single = first_batch && batch.len() == 1;
            first_batch = false;

            let mut agency_ids = Vec::with_capacity(batch.len());
            let mut names = Vec::with_capacity(batch.len());
            let mut urls = Vec::with_capacity(batch.len());
            let mut timezones = Vec::with_capacity(batch.len());
            let mut langs = Vec::with_capacity(batch.len());
            let mut phones = Vec::with_capacity(batch.len());
            let mut fare_urls = Vec::with_capacity(batch.len());

            for row in &batch {
                let agency_id = match &row.agency_id {
                    Some(id) => id.clone(),
                    None if single => agency_key.to_string(),
                    None => String::new(),
                };
                agency_ids.push(agency_id);
                names.push(row.agency_name.clone());
                urls.push(row.agency_url.clone());
                timezones.push(row.agency_timezone.clone());
                langs.push(row.agency_lang.clone());
                phones.push(row.agency_phone.clone());
                fare_urls.push(row.agency_fare_url.clone());
            }

            sqlx::query(
                r#"INSERT INTO agency
                   (agency_entry_id, agency_id, agency_name, agency_url, agency_timezone, agency_lang, agency_phone, agency_fare_url)
                   SELECT $1::bigint, * FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::text[], $7::text[], $8::text[])"#,
            )
            .bind(entry_id)
            .bind(&agency_ids)
            .bind(&names)
            .bind(&urls)
            .bind(&timezones)
            .bind(&langs)
            .bind(&phones)
            .bind(&fare_urls)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, agency_id FROM agency WHERE agency_entry_id = $1 AND agency_id = ANY($2)",
            )
            .bind(entry_id)
            .bind(&agency_ids)
            .fetch_all(&mut **tx)
            .await?;

            for (id, natural) in rows {
                cache.put(EntityKind::Agency, &natural, id);
            }
            stats.agencies += batch.len();
        }

        Ok(())
    }

    /// Each calendar row first creates its Service, then the calendar
    /// pattern referencing it.
    async fn import_calendars(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<CalendarRecord>(
            FeedFile::Calendar,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading calendar.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let service_naturals: Vec<String> =
                batch.iter().map(|r| r.service_id.clone()).collect();

            sqlx::query(
                "INSERT INTO service (agency_entry_id, service_id) SELECT $1::bigint, * FROM UNNEST($2::text[])",
            )
            .bind(entry_id)
            .bind(&service_naturals)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, service_id FROM service WHERE agency_entry_id = $1 AND service_id = ANY($2)",
            )
            .bind(entry_id)
            .bind(&service_naturals)
            .fetch_all(&mut **tx)
            .await?;

            for (id, natural) in rows {
                cache.put(EntityKind::Service, &natural, id);
            }
            stats.services += batch.len();

            let mut service_refs = Vec::with_capacity(batch.len());
            let mut mondays = Vec::with_capacity(batch.len());
            let mut tuesdays = Vec::with_capacity(batch.len());
            let mut wednesdays = Vec::with_capacity(batch.len());
            let mut thursdays = Vec::with_capacity(batch.len());
            let mut fridays = Vec::with_capacity(batch.len());
            let mut saturdays = Vec::with_capacity(batch.len());
            let mut sundays = Vec::with_capacity(batch.len());
            let mut start_dates = Vec::with_capacity(batch.len());
            let mut end_dates = Vec::with_capacity(batch.len());

            for row in &batch {
                service_refs.push(cache.require(EntityKind::Service, &row.service_id)?);
                mondays.push(row.monday);
                tuesdays.push(row.tuesday);
                wednesdays.push(row.wednesday);
                thursdays.push(row.thursday);
                fridays.push(row.friday);
                saturdays.push(row.saturday);
                sundays.push(row.sunday);
                start_dates.push(row.start_date.map(midnight_utc));
                end_dates.push(row.end_date.map(midnight_utc));
            }

            sqlx::query(
                r#"INSERT INTO calendar
                   (service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday, start_date, end_date)
                   SELECT * FROM UNNEST($1::bigint[], $2::int[], $3::int[], $4::int[], $5::int[], $6::int[], $7::int[], $8::int[], $9::timestamptz[], $10::timestamptz[])"#,
            )
            .bind(&service_refs)
            .bind(&mondays)
            .bind(&tuesdays)
            .bind(&wednesdays)
            .bind(&thursdays)
            .bind(&fridays)
            .bind(&saturdays)
            .bind(&sundays)
            .bind(&start_dates)
            .bind(&end_dates)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            stats.calendars += batch.len();
        }

        Ok(())
    }

    /// Exception dates may reference services that `calendar.txt` never
    /// declared; those services are created implicitly, once per natural
    /// key.
    async fn import_calendar_dates(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = match dir.read_batches::<CalendarDateRecord>(
            FeedFile::CalendarDates,
            self.config.batch_size,
            self.config.channel_capacity,
        ) {
            Ok(rx) => rx,
            Err(ImportError::FileNotFound(name)) => {
                log::info!("{}: skipping {}", agency_key, name);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        log::info!("{}: reading calendar_dates.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let mut service_refs = Vec::with_capacity(batch.len());
            let mut dates = Vec::with_capacity(batch.len());
            let mut exception_types = Vec::with_capacity(batch.len());

            for row in &batch {
                let service_ref = match cache.get(EntityKind::Service, &row.service_id) {
                    Some(id) => id,
                    None => {
                        log::debug!("{}: creating implicit service {}", agency_key, row.service_id);
                        let id: i64 = sqlx::query_scalar(
                            "INSERT INTO service (agency_entry_id, service_id) VALUES ($1, $2) RETURNING id",
                        )
                        .bind(entry_id)
                        .bind(&row.service_id)
                        .fetch_one(&mut **tx)
                        .await
                        .map_err(ImportError::from_db)?;
                        cache.put(EntityKind::Service, &row.service_id, id);
                        stats.services += 1;
                        id
                    }
                };
                service_refs.push(service_ref);
                dates.push(row.date.map(midnight_utc));
                exception_types.push(row.exception_type);
            }

            sqlx::query(
                r#"INSERT INTO calendar_date (service_id, date, exception_type)
                   SELECT * FROM UNNEST($1::bigint[], $2::timestamptz[], $3::int[])"#,
            )
            .bind(&service_refs)
            .bind(&dates)
            .bind(&exception_types)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            stats.calendar_dates += batch.len();
        }

        Ok(())
    }

    async fn import_stops(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<StopRecord>(
            FeedFile::Stops,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading stops.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let mut stop_ids = Vec::with_capacity(batch.len());
            let mut codes = Vec::with_capacity(batch.len());
            let mut names = Vec::with_capacity(batch.len());
            let mut descs = Vec::with_capacity(batch.len());
            let mut lats = Vec::with_capacity(batch.len());
            let mut lons = Vec::with_capacity(batch.len());
            let mut zone_ids = Vec::with_capacity(batch.len());
            let mut urls = Vec::with_capacity(batch.len());
            let mut location_types = Vec::with_capacity(batch.len());
            let mut parent_stations = Vec::with_capacity(batch.len());
            let mut timezones = Vec::with_capacity(batch.len());
            let mut wheelchairs = Vec::with_capacity(batch.len());
            let mut platform_codes = Vec::with_capacity(batch.len());

            for row in &batch {
                stop_ids.push(row.stop_id.clone());
                codes.push(row.stop_code.clone());
                names.push(row.stop_name.clone());
                descs.push(row.stop_desc.clone());
                lats.push(row.stop_lat);
                lons.push(row.stop_lon);
                zone_ids.push(row.zone_id.clone());
                urls.push(row.stop_url.clone());
                location_types.push(row.location_type);
                parent_stations.push(row.parent_station.clone());
                timezones.push(row.stop_timezone.clone());
                wheelchairs.push(row.wheelchair_boarding);
                platform_codes.push(row.platform_code.clone());
            }

            sqlx::query(
                r#"INSERT INTO stop
                   (agency_entry_id, stop_id, stop_code, stop_name, stop_desc, stop_lat, stop_lon, zone_id, stop_url, location_type, parent_station, stop_timezone, wheelchair_boarding, platform_code)
                   SELECT $1::bigint, * FROM UNNEST($2::text[], $3::text[], $4::text[], $5::text[], $6::float8[], $7::float8[], $8::text[], $9::text[], $10::int[], $11::text[], $12::text[], $13::int[], $14::text[])"#,
            )
            .bind(entry_id)
            .bind(&stop_ids)
            .bind(&codes)
            .bind(&names)
            .bind(&descs)
            .bind(&lats)
            .bind(&lons)
            .bind(&zone_ids)
            .bind(&urls)
            .bind(&location_types)
            .bind(&parent_stations)
            .bind(&timezones)
            .bind(&wheelchairs)
            .bind(&platform_codes)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, stop_id FROM stop WHERE agency_entry_id = $1 AND stop_id = ANY($2)",
            )
            .bind(entry_id)
            .bind(&stop_ids)
            .fetch_all(&mut **tx)
            .await?;

            for (id, natural) in rows {
                cache.put(EntityKind::Stop, &natural, id);
            }
            stats.stops += batch.len();
        }

        Ok(())
    }

    async fn import_routes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<RouteRecord>(
            FeedFile::Routes,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading routes.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let mut route_ids = Vec::with_capacity(batch.len());
            let mut agency_refs = Vec::with_capacity(batch.len());
            let mut short_names = Vec::with_capacity(batch.len());
            let mut long_names = Vec::with_capacity(batch.len());
            let mut descs = Vec::with_capacity(batch.len());
            let mut route_types = Vec::with_capacity(batch.len());
            let mut urls = Vec::with_capacity(batch.len());
            let mut colors = Vec::with_capacity(batch.len());
            let mut text_colors = Vec::with_capacity(batch.len());

            for row in &batch {
                let agency_ref =
                    cache.require(EntityKind::Agency, row.agency_id.as_deref().unwrap_or(""))?;
                route_ids.push(row.route_id.clone());
                agency_refs.push(agency_ref);
                short_names.push(row.route_short_name.clone());
                long_names.push(row.route_long_name.clone());
                descs.push(row.route_desc.clone());
                route_types.push(row.route_type);
                urls.push(row.route_url.clone());
                colors.push(row.route_color.clone());
                text_colors.push(row.route_text_color.clone());
            }

            sqlx::query(
                r#"INSERT INTO route
                   (agency_entry_id, route_id, agency_id, route_short_name, route_long_name, route_desc, route_type, route_url, route_color, route_text_color)
                   SELECT $1::bigint, * FROM UNNEST($2::text[], $3::bigint[], $4::text[], $5::text[], $6::text[], $7::int[], $8::text[], $9::text[], $10::text[])"#,
            )
            .bind(entry_id)
            .bind(&route_ids)
            .bind(&agency_refs)
            .bind(&short_names)
            .bind(&long_names)
            .bind(&descs)
            .bind(&route_types)
            .bind(&urls)
            .bind(&colors)
            .bind(&text_colors)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, route_id FROM route WHERE agency_entry_id = $1 AND route_id = ANY($2)",
            )
            .bind(entry_id)
            .bind(&route_ids)
            .fetch_all(&mut **tx)
            .await?;

            for (id, natural) in rows {
                cache.put(EntityKind::Route, &natural, id);
            }
            stats.routes += batch.len();
        }

        Ok(())
    }

    /// Shape points are grouped by shape natural key before insertion; the
    /// Shape row for each group is created at most once per import no
    /// matter how many batches its points span.
    async fn import_shapes(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = match dir.read_batches::<ShapeRecord>(
            FeedFile::Shapes,
            self.config.batch_size,
            self.config.channel_capacity,
        ) {
            Ok(rx) => rx,
            Err(ImportError::FileNotFound(name)) => {
                log::info!("{}: skipping {}", agency_key, name);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        log::info!("{}: reading shapes.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let groups = group_by_shape(batch?);

            let shapes_before = cache.len(EntityKind::Shape);
            let mut shape_refs = Vec::new();
            let mut lats = Vec::new();
            let mut lons = Vec::new();
            let mut sequences = Vec::new();
            let mut distances = Vec::new();

            for group in groups {
                let shape_ref = cache
                    .get_or_create_shape(&group.shape_id, || {
                        create_shape(tx, entry_id, &group.shape_id)
                    })
                    .await?;

                for point in &group.points {
                    shape_refs.push(shape_ref);
                    lats.push(point.shape_pt_lat);
                    lons.push(point.shape_pt_lon);
                    sequences.push(point.shape_pt_sequence);
                    distances.push(point.shape_dist_traveled);
                }
            }
            stats.shapes += cache.len(EntityKind::Shape) - shapes_before;

            sqlx::query(
                r#"INSERT INTO shape_sequence
                   (shape_id, shape_pt_lat, shape_pt_lon, shape_pt_sequence, shape_dist_traveled)
                   SELECT * FROM UNNEST($1::bigint[], $2::float8[], $3::float8[], $4::int[], $5::float8[])"#,
            )
            .bind(&shape_refs)
            .bind(&lats)
            .bind(&lons)
            .bind(&sequences)
            .bind(&distances)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            stats.shape_points += shape_refs.len();
        }

        Ok(())
    }

    async fn import_trips(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<TripRecord>(
            FeedFile::Trips,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading trips.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let mut trip_ids = Vec::with_capacity(batch.len());
            let mut route_refs = Vec::with_capacity(batch.len());
            let mut service_refs = Vec::with_capacity(batch.len());
            let mut headsigns = Vec::with_capacity(batch.len());
            let mut short_names = Vec::with_capacity(batch.len());
            let mut direction_ids = Vec::with_capacity(batch.len());
            let mut block_ids = Vec::with_capacity(batch.len());
            let mut shape_refs = Vec::with_capacity(batch.len());
            let mut wheelchairs = Vec::with_capacity(batch.len());
            let mut bikes = Vec::with_capacity(batch.len());

            for row in &batch {
                route_refs.push(cache.require(EntityKind::Route, &row.route_id)?);
                service_refs.push(cache.require(EntityKind::Service, &row.service_id)?);
                // shape is the one optional reference on a trip
                let shape_ref = match &row.shape_id {
                    Some(natural) => Some(cache.require(EntityKind::Shape, natural)?),
                    None => None,
                };
                shape_refs.push(shape_ref);
                trip_ids.push(row.trip_id.clone());
                headsigns.push(row.trip_headsign.clone());
                short_names.push(row.trip_short_name.clone());
                direction_ids.push(row.direction_id);
                block_ids.push(row.block_id.clone());
                wheelchairs.push(row.wheelchair_accessible);
                bikes.push(row.bikes_allowed);
            }

            sqlx::query(
                r#"INSERT INTO trip
                   (agency_entry_id, trip_id, route_id, service_id, trip_headsign, trip_short_name, direction_id, block_id, shape_id, wheelchair_accessible, bikes_allowed)
                   SELECT $1::bigint, * FROM UNNEST($2::text[], $3::bigint[], $4::bigint[], $5::text[], $6::text[], $7::int[], $8::text[], $9::bigint[], $10::int[], $11::int[])"#,
            )
            .bind(entry_id)
            .bind(&trip_ids)
            .bind(&route_refs)
            .bind(&service_refs)
            .bind(&headsigns)
            .bind(&short_names)
            .bind(&direction_ids)
            .bind(&block_ids)
            .bind(&shape_refs)
            .bind(&wheelchairs)
            .bind(&bikes)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            let rows: Vec<(i64, String)> = sqlx::query_as(
                "SELECT id, trip_id FROM trip WHERE agency_entry_id = $1 AND trip_id = ANY($2)",
            )
            .bind(entry_id)
            .bind(&trip_ids)
            .fetch_all(&mut **tx)
            .await?;

            for (id, natural) in rows {
                cache.put(EntityKind::Trip, &natural, id);
            }
            stats.trips += batch.len();
        }

        Ok(())
    }

    async fn import_stop_times(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cache: &mut ReferenceCache,
        stats: &mut ImportStats,
        entry_id: i64,
        agency_key: &str,
        dir: &FeedDirectory,
    ) -> Result<(), ImportError> {
        let mut rx = dir.read_batches::<StopTimeRecord>(
            FeedFile::StopTimes,
            self.config.batch_size,
            self.config.channel_capacity,
        )?;
        log::info!("{}: reading stop_times.txt", agency_key);

        while let Some(batch) = rx.recv().await {
            let batch = batch?;

            let mut trip_refs = Vec::with_capacity(batch.len());
            let mut stop_refs = Vec::with_capacity(batch.len());
            let mut arrivals = Vec::with_capacity(batch.len());
            let mut departures = Vec::with_capacity(batch.len());
            let mut sequences = Vec::with_capacity(batch.len());
            let mut headsigns = Vec::with_capacity(batch.len());
            let mut pickup_types = Vec::with_capacity(batch.len());
            let mut drop_off_types = Vec::with_capacity(batch.len());
            let mut distances = Vec::with_capacity(batch.len());
            let mut timepoints = Vec::with_capacity(batch.len());

            for row in &batch {
                trip_refs.push(cache.require(EntityKind::Trip, &row.trip_id)?);
                stop_refs.push(cache.require(EntityKind::Stop, &row.stop_id)?);
                arrivals.push(row.arrival_time.clone());
                departures.push(row.departure_time.clone());
                sequences.push(row.stop_sequence);
                headsigns.push(row.stop_headsign.clone());
                pickup_types.push(row.pickup_type);
                drop_off_types.push(row.drop_off_type);
                distances.push(row.shape_dist_traveled);
                timepoints.push(row.timepoint);
            }

            sqlx::query(
                r#"INSERT INTO stop_time
                   (agency_entry_id, trip_id, stop_id, arrival_time, departure_time, stop_sequence, stop_headsign, pickup_type, drop_off_type, shape_dist_traveled, timepoint)
                   SELECT $1::bigint, * FROM UNNEST($2::bigint[], $3::bigint[], $4::text[], $5::text[], $6::int[], $7::text[], $8::int[], $9::int[], $10::float8[], $11::int[])"#,
            )
            .bind(entry_id)
            .bind(&trip_refs)
            .bind(&stop_refs)
            .bind(&arrivals)
            .bind(&departures)
            .bind(&sequences)
            .bind(&headsigns)
            .bind(&pickup_types)
            .bind(&drop_off_types)
            .bind(&distances)
            .bind(&timepoints)
            .execute(&mut **tx)
            .await
            .map_err(ImportError::from_db)?;

            stats.stop_times += batch.len();
            log::debug!(
                "{}: inserted {} stop_time rows so far",
                agency_key,
                stats.stop_times
            );
        }

        Ok(())
    }
}
