use gtfsdb::config::ImporterConfig;
use gtfsdb::error::ImportError;
use gtfsdb::import::refs::EntityKind;
use gtfsdb::import::{AgencyFeed, FeedImporter, ImportQueue};
use gtfsdb::queries;
use gtfsdb::test_support::{FeedFixture, TestDatabase};

/// A complete single-agency feed exercising every required file.
fn minimal_feed() -> FeedFixture {
    let fixture = FeedFixture::new().expect("tempdir");
    fixture
        .write(
            "agency.txt",
            "agency_id,agency_name,agency_url,agency_timezone\n\
             A1,Metro Transit,https://metro.example,America/New_York\n",
        )
        .expect("write agency");
    fixture
        .write(
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WK,1,1,1,1,1,0,0,20250101,20251231\n",
        )
        .expect("write calendar");
    fixture
        .write(
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\n\
             S1,First St,40.0,-74.0\n\
             S2,Second St,40.1,-74.1\n",
        )
        .expect("write stops");
    fixture
        .write(
            "routes.txt",
            "route_id,agency_id,route_short_name,route_long_name,route_type\n\
             R1,A1,1,Main Line,3\n",
        )
        .expect("write routes");
    fixture
        .write(
            "trips.txt",
            "route_id,service_id,trip_id\n\
             R1,WK,T1\n",
        )
        .expect("write trips");
    fixture
        .write(
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:30,S1,1\n\
             T1,08:10:00,08:10:30,S2,2\n",
        )
        .expect("write stop_times");
    fixture
}

fn importer(db: &TestDatabase) -> FeedImporter {
    FeedImporter::new(db.pool_clone(), ImporterConfig::default())
}

#[tokio::test]
async fn full_feed_imports_and_reads_back() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();
    feed.write(
        "calendar_dates.txt",
        "service_id,date,exception_type\nWK,20250704,2\n",
    )
    .expect("write calendar_dates");

    let stats = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("import succeeds");

    assert_eq!(stats.agencies, 1);
    assert_eq!(stats.services, 1);
    assert_eq!(stats.calendars, 1);
    assert_eq!(stats.calendar_dates, 1);
    assert_eq!(stats.stops, 2);
    assert_eq!(stats.routes, 1);
    assert_eq!(stats.trips, 1);
    assert_eq!(stats.stop_times, 2);

    let entry_id = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");

    let agencies = queries::get_agencies(db.pool(), entry_id)
        .await
        .expect("agencies");
    assert_eq!(agencies.len(), 1);
    assert_eq!(agencies[0].agency_id, "A1");
    assert_eq!(agencies[0].agency_name, "Metro Transit");

    let stops = queries::get_stops(db.pool(), entry_id).await.expect("stops");
    assert_eq!(stops.len(), 2);

    let routes = queries::get_routes(db.pool(), entry_id)
        .await
        .expect("routes");
    assert_eq!(routes.len(), 1);
    // route references the agency by surrogate key, not the feed string
    assert_eq!(routes[0].agency_id, Some(agencies[0].id));

    let trips = queries::get_trips(db.pool(), entry_id).await.expect("trips");
    assert_eq!(trips.len(), 1);
    assert_eq!(trips[0].route_id, routes[0].id);
    assert_eq!(trips[0].shape_id, None);

    let stop_times = queries::get_stop_times(db.pool(), trips[0].id)
        .await
        .expect("stop times");
    let arrivals: Vec<Option<&str>> = stop_times
        .iter()
        .map(|st| st.arrival_time.as_deref())
        .collect();
    assert_eq!(arrivals, vec![Some("08:00:00"), Some("08:10:00")]);
}

#[tokio::test]
async fn shape_points_read_back_in_sequence_order() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();
    // points arrive out of order in the file
    feed.write(
        "shapes.txt",
        "shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence\n\
         SH1,40.2,-74.2,3\n\
         SH1,40.0,-74.0,1\n\
         SH1,40.1,-74.1,2\n",
    )
    .expect("write shapes");
    feed.write(
        "trips.txt",
        "route_id,service_id,trip_id,shape_id\nR1,WK,T1,SH1\n",
    )
    .expect("write trips");

    let stats = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("import succeeds");
    assert_eq!(stats.shapes, 1);
    assert_eq!(stats.shape_points, 3);

    let entry_id = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");
    let trips = queries::get_trips(db.pool(), entry_id).await.expect("trips");
    let shape_id = trips[0].shape_id.expect("trip has a shape");

    let points = queries::get_shape_points(db.pool(), shape_id)
        .await
        .expect("shape points");
    let sequences: Vec<i32> = points.iter().map(|p| p.shape_pt_sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    let lats: Vec<f64> = points.iter().map(|p| p.shape_pt_lat).collect();
    assert_eq!(lats, vec![40.0, 40.1, 40.2]);
}

#[tokio::test]
async fn reimport_replaces_previous_generation() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();

    importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("first import succeeds");
    let first_entry = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");

    // second feed version drops one stop
    feed.write(
        "stops.txt",
        "stop_id,stop_name,stop_lat,stop_lon\nS1,First St,40.0,-74.0\n",
    )
    .expect("rewrite stops");
    feed.write(
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         T1,08:00:00,08:00:30,S1,1\n",
    )
    .expect("rewrite stop_times");

    let stats = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("second import succeeds");
    assert_eq!(stats.stops, 1);

    let second_entry = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");
    assert_ne!(first_entry, second_entry);

    // nothing from the first generation survives anywhere in the table
    let total_stops: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stop")
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(total_stops, 1);
    let entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM agency_entry")
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn failed_import_preserves_prior_generation() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();

    importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("first import succeeds");
    let first_entry = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");

    feed.write(
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
         T9,08:00:00,08:00:30,S1,1\n",
    )
    .expect("rewrite stop_times");

    let err = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect_err("bad reference fails the import");
    assert!(matches!(
        err,
        ImportError::ReferenceResolution {
            kind: EntityKind::Trip,
            ..
        }
    ));

    // the rollback left the first generation fully intact
    let entry = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation still exists");
    assert_eq!(entry, first_entry);
    let stops = queries::get_stops(db.pool(), entry).await.expect("stops");
    assert_eq!(stops.len(), 2);
}

#[tokio::test]
async fn single_agency_feed_may_omit_agency_id() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();
    feed.write(
        "agency.txt",
        "agency_name,agency_url,agency_timezone\n\
         Metro Transit,https://metro.example,America/New_York\n",
    )
    .expect("rewrite agency");
    feed.write(
        "routes.txt",
        "route_id,route_short_name,route_long_name,route_type\nR1,1,Main Line,3\n",
    )
    .expect("rewrite routes");

    importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("import succeeds");

    let entry_id = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup")
        .expect("generation exists");
    let agencies = queries::get_agencies(db.pool(), entry_id)
        .await
        .expect("agencies");
    // the agency key fills in for the missing agency_id
    assert_eq!(agencies[0].agency_id, "metro");

    let routes = queries::get_routes(db.pool(), entry_id)
        .await
        .expect("routes");
    assert_eq!(routes[0].agency_id, Some(agencies[0].id));
}

#[tokio::test]
async fn implicit_service_is_created_once() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();
    // two exception dates for a service calendar.txt never declared
    feed.write(
        "calendar_dates.txt",
        "service_id,date,exception_type\n\
         HOL,20250101,1\n\
         HOL,20251225,1\n",
    )
    .expect("write calendar_dates");

    let stats = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("import succeeds");
    assert_eq!(stats.services, 2, "WK from calendar.txt plus implicit HOL");
    assert_eq!(stats.calendar_dates, 2);

    let services: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM service")
        .fetch_one(db.pool())
        .await
        .expect("count");
    assert_eq!(services, 2);
}

#[tokio::test]
async fn optional_files_are_skipped_when_absent() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();

    let stats = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect("import succeeds without calendar_dates.txt or shapes.txt");

    assert_eq!(stats.calendar_dates, 0);
    assert_eq!(stats.shapes, 0);
    assert_eq!(stats.shape_points, 0);
}

#[tokio::test]
async fn missing_required_file_aborts() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = FeedFixture::new().expect("tempdir");
    feed.write(
        "agency.txt",
        "agency_id,agency_name,agency_url,agency_timezone\n\
         A1,Metro Transit,https://metro.example,America/New_York\n",
    )
    .expect("write agency");

    let err = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect_err("calendar.txt is required");
    assert!(matches!(err, ImportError::FileNotFound(name) if name == "calendar.txt"));

    // nothing was committed
    let generation = queries::current_generation(db.pool(), "metro")
        .await
        .expect("lookup");
    assert_eq!(generation, None);
}

#[tokio::test]
async fn malformed_rows_abort_the_import() {
    let db = TestDatabase::new().await.expect("test database");
    let feed = minimal_feed();
    // stop_id column missing entirely, so rows cannot deserialize
    feed.write(
        "stop_times.txt",
        "trip_id,arrival_time,departure_time,stop_sequence\n\
         T1,08:00:00,08:00:30,1\n",
    )
    .expect("rewrite stop_times");

    let err = importer(&db)
        .import_agency("metro", &feed.directory())
        .await
        .expect_err("unparseable rows fail the import");
    assert!(matches!(err, ImportError::Parse { ref file, .. } if file == "stop_times.txt"));
}

#[tokio::test]
async fn queue_isolates_agencies_and_continues_past_failures() {
    let db = TestDatabase::new().await.expect("test database");
    let good_a = minimal_feed();
    let good_b = minimal_feed();
    let broken = FeedFixture::new().expect("tempdir");

    let queue = ImportQueue::new(importer(&db));
    let outcomes = queue
        .import_all(vec![
            AgencyFeed {
                agency_key: "alpha".to_string(),
                directory: good_a.directory(),
            },
            AgencyFeed {
                agency_key: "broken".to_string(),
                directory: broken.directory(),
            },
            AgencyFeed {
                agency_key: "beta".to_string(),
                directory: good_b.directory(),
            },
        ])
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].result.is_ok());
    assert!(outcomes[1].result.is_err());
    assert!(outcomes[2].result.is_ok(), "failure does not stop the queue");

    let alpha = queries::current_generation(db.pool(), "alpha")
        .await
        .expect("lookup")
        .expect("alpha generation");
    let beta = queries::current_generation(db.pool(), "beta")
        .await
        .expect("lookup")
        .expect("beta generation");
    assert_ne!(alpha, beta);

    // each agency sees only its own rows
    let alpha_stops = queries::get_stops(db.pool(), alpha).await.expect("stops");
    let beta_stops = queries::get_stops(db.pool(), beta).await.expect("stops");
    assert_eq!(alpha_stops.len(), 2);
    assert_eq!(beta_stops.len(), 2);

    // reimporting one agency leaves the other untouched
    importer(&db)
        .import_agency("alpha", &good_a.directory())
        .await
        .expect("reimport succeeds");
    assert_eq!(
        queries::current_generation(db.pool(), "beta")
            .await
            .expect("lookup"),
        Some(beta)
    );
}
