//! Aggregation queries over `daily_reports`
//!
//! Snapshot queries (total, world, region, province, city) are pinned to the
//! latest day of the whole table: `max(date(last_update))`, not the latest day
//! of each group. A location that did not report on that day is left out.
//! Nullable counters count as zero.
//!
//! Timestamps are compared through `date()` / `datetime()`, so ISO-8601 text
//! with a `T` or a space separator, with or without an offset, can be mixed.

use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::filter::LocationFilter;
use super::{Database, RegionStatistics, TimeSeriesPoint, TotalStatistics};
use crate::error::Result;

const LATEST_DAY: &str = r#"
WITH update_info AS (
    SELECT max(date(last_update)) AS last_update_date
    FROM daily_reports
)
"#;

const LATEST_DAY_JOIN: &str =
    " INNER JOIN update_info AS ui ON date(dr.last_update) = ui.last_update_date";

// Rows whose four counters are all zero carry no activity
const HAS_ACTIVITY: &str = "(coalesce(dr.active, 0) != 0 OR coalesce(dr.confirmed, 0) != 0 \
     OR coalesce(dr.deaths, 0) != 0 OR coalesce(dr.recovered, 0) != 0)";

const SUMMED_COUNTERS: &str = r#"
    coalesce(sum(dr.active), 0) AS active,
    coalesce(sum(dr.confirmed), 0) AS confirmed,
    coalesce(sum(dr.deaths), 0) AS deaths,
    coalesce(sum(dr.recovered), 0) AS recovered"#;

const ROW_COUNTERS: &str = r#"
    coalesce(dr.active, 0) AS active,
    coalesce(dr.confirmed, 0) AS confirmed,
    coalesce(dr.deaths, 0) AS deaths,
    coalesce(dr.recovered, 0) AS recovered"#;

/// Placeholder values for provinces and cities that do not name a place
const UNNAMED: &str = "('NaN', 'Unassigned')";

#[derive(sqlx::FromRow)]
struct TotalRow {
    active: i64,
    confirmed: i64,
    deaths: i64,
    recovered: i64,
    last_update: Option<chrono::DateTime<chrono::Utc>>,
}

impl Database {
    /// Sums of every counter over the latest day, or `None` when the table is empty
    pub async fn total_statistics(&self) -> Result<Option<TotalStatistics>> {
        let sql = format!(
            "{LATEST_DAY}SELECT{SUMMED_COUNTERS}, max(datetime(dr.last_update)) AS last_update \
             FROM daily_reports AS dr{LATEST_DAY_JOIN}"
        );

        // An aggregate without GROUP BY always yields one row; no matching
        // reports show up as a NULL timestamp.
        let row: TotalRow = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(row.last_update.map(|last_update| TotalStatistics {
            active: row.active,
            confirmed: row.confirmed,
            deaths: row.deaths,
            recovered: row.recovered,
            last_update,
        }))
    }

    /// One row per region with activity on the latest day
    ///
    /// Coordinates come from the region's report with the most confirmed
    /// cases; ties go to the smallest province, then the smallest city.
    pub async fn world_statistics(&self) -> Result<Vec<RegionStatistics>> {
        let sql = format!(
            r#"{LATEST_DAY},
latest AS (
    SELECT dr.*
    FROM daily_reports AS dr{LATEST_DAY_JOIN}
    WHERE {HAS_ACTIVITY}
),
statistics AS (
    SELECT
        dr.region,{SUMMED_COUNTERS},
        max(datetime(dr.last_update)) AS last_update
    FROM latest AS dr
    GROUP BY dr.region
),
coordinates AS (
    SELECT
        region,
        latitude,
        longitude,
        row_number() OVER (
            PARTITION BY region
            ORDER BY coalesce(confirmed, 0) DESC, coalesce(province, '') ASC, coalesce(city, '') ASC
        ) AS position
    FROM latest
)
SELECT
    s.region,
    NULL AS province,
    NULL AS city,
    c.latitude,
    c.longitude,
    s.active,
    s.confirmed,
    s.deaths,
    s.recovered,
    s.last_update
FROM statistics AS s
INNER JOIN coordinates AS c ON c.region = s.region AND c.position = 1
ORDER BY s.confirmed DESC, s.region ASC"#
        );

        let rows = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// One row per named province of a region on the latest day
    ///
    /// Latitude is the maximum over the province's rows, longitude the average.
    pub async fn region_statistics(&self, filter: &LocationFilter) -> Result<Vec<RegionStatistics>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            r#"{LATEST_DAY}SELECT
    dr.region,
    dr.province,
    NULL AS city,
    max(dr.latitude) AS latitude,
    avg(dr.longitude) AS longitude,{SUMMED_COUNTERS},
    max(datetime(dr.last_update)) AS last_update
FROM daily_reports AS dr{LATEST_DAY_JOIN}
WHERE dr.province IS NOT NULL
    AND dr.province NOT IN {UNNAMED}
    AND {HAS_ACTIVITY}"#
        ));
        filter.push_and(&mut builder, "dr");
        builder.push(" GROUP BY dr.region, dr.province ORDER BY confirmed DESC, dr.province ASC");

        self.fetch_locations(builder, filter).await
    }

    /// One row per named city of a province on the latest day
    pub async fn province_statistics(&self, filter: &LocationFilter) -> Result<Vec<RegionStatistics>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            r#"{LATEST_DAY}SELECT
    dr.region,
    dr.province,
    dr.city,
    dr.latitude,
    dr.longitude,{ROW_COUNTERS},
    dr.last_update
FROM daily_reports AS dr{LATEST_DAY_JOIN}
WHERE dr.city IS NOT NULL
    AND dr.city NOT IN {UNNAMED}
    AND {HAS_ACTIVITY}"#
        ));
        filter.push_and(&mut builder, "dr");
        builder.push(" ORDER BY confirmed DESC, dr.city ASC");

        self.fetch_locations(builder, filter).await
    }

    /// Every report of a single city on the latest day, zero rows included
    pub async fn city_statistics(&self, filter: &LocationFilter) -> Result<Vec<RegionStatistics>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            r#"{LATEST_DAY}SELECT
    dr.region,
    dr.province,
    dr.city,
    dr.latitude,
    dr.longitude,{ROW_COUNTERS},
    dr.last_update
FROM daily_reports AS dr{LATEST_DAY_JOIN}"#
        ));
        filter.push_where(&mut builder, "dr");
        builder.push(" ORDER BY confirmed DESC, datetime(dr.last_update) DESC");

        self.fetch_locations(builder, filter).await
    }

    /// Daily sums over the reports matching `filter`, across all days
    pub async fn time_series(&self, filter: &LocationFilter) -> Result<Vec<TimeSeriesPoint>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT date(dr.last_update) AS day,{SUMMED_COUNTERS} FROM daily_reports AS dr"
        ));
        filter.push_where(&mut builder, "dr");
        builder.push(" GROUP BY date(dr.last_update) ORDER BY confirmed DESC, day ASC");

        debug!(filter = ?filter, "fetching time series");
        let rows = builder
            .build_query_as::<TimeSeriesPoint>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_locations(
        &self,
        mut builder: QueryBuilder<'_, Sqlite>,
        filter: &LocationFilter,
    ) -> Result<Vec<RegionStatistics>> {
        debug!(filter = ?filter, "fetching location statistics");
        let rows = builder
            .build_query_as::<RegionStatistics>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::fixtures::{day, Report};
    use crate::error::StatisticsError;

    fn region(name: &str) -> LocationFilter {
        LocationFilter::from_path(&[name]).unwrap()
    }

    #[tokio::test]
    async fn total_is_none_for_empty_table() {
        let db = Database::in_memory().await;
        assert_eq!(db.total_statistics().await.unwrap(), None);
    }

    #[tokio::test]
    async fn total_sums_only_the_latest_day() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("Italy", day(1, 9), 500).counters(400, 500, 50, 50),
            Report::new("Italy", day(2, 8), 700).counters(600, 700, 60, 40),
            Report::new("Spain", day(2, 20), 300).counters(250, 300, 30, 20),
        ])
        .await;

        let total = db.total_statistics().await.unwrap().unwrap();
        assert_eq!(total.active, 850);
        assert_eq!(total.confirmed, 1000);
        assert_eq!(total.deaths, 90);
        assert_eq!(total.recovered, 60);
        assert_eq!(total.last_update, day(2, 20));
    }

    #[tokio::test]
    async fn world_skips_regions_without_activity_and_orders_by_confirmed() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("Italy", day(2, 8), 100),
            Report::new("China", day(2, 8), 900),
            Report::new("Nowhere", day(2, 8), 0).counters(0, 0, 0, 0),
        ])
        .await;

        let rows = db.world_statistics().await.unwrap();
        let regions: Vec<_> = rows.iter().map(|r| r.region.as_str()).collect();
        assert_eq!(regions, ["China", "Italy"]);
        assert!(rows.iter().all(|r| r.province.is_none() && r.city.is_none()));
    }

    #[tokio::test]
    async fn world_drops_regions_silent_on_the_latest_day() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("Italy", day(1, 8), 100),
            Report::new("Spain", day(2, 8), 50),
        ])
        .await;

        let rows = db.world_statistics().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].region, "Spain");
    }

    #[tokio::test]
    async fn world_coordinates_come_from_the_largest_report() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 10).province("Alaska").at(61.0, -150.0),
            Report::new("US", day(2, 8), 90).province("New York").at(42.0, -75.0),
        ])
        .await;

        let rows = db.world_statistics().await.unwrap();
        assert_eq!(rows[0].confirmed, 100);
        assert_eq!(rows[0].latitude, Some(42.0));
        assert_eq!(rows[0].longitude, Some(-75.0));
    }

    #[tokio::test]
    async fn world_coordinate_ties_go_to_smallest_province() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 50).province("Washington").at(47.0, -120.0),
            Report::new("US", day(2, 8), 50).province("California").at(36.0, -119.0),
        ])
        .await;

        let rows = db.world_statistics().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].latitude, Some(36.0));
        assert_eq!(rows[0].longitude, Some(-119.0));
    }

    #[tokio::test]
    async fn region_uses_latest_day_only() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(1, 8), 100).province("NY"),
            Report::new("US", day(2, 8), 150).province("NY"),
        ])
        .await;

        let rows = db.region_statistics(&region("US")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].province.as_deref(), Some("NY"));
        assert_eq!(rows[0].confirmed, 150);
        assert_eq!(rows[0].last_update, day(2, 8));
    }

    #[tokio::test]
    async fn region_excludes_unnamed_and_idle_provinces() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 10),
            Report::new("US", day(2, 8), 20).province("NaN"),
            Report::new("US", day(2, 8), 30).province("Unassigned"),
            Report::new("US", day(2, 8), 0).province("Guam").counters(0, 0, 0, 0),
            Report::new("US", day(2, 8), 40).province("Texas"),
            Report::new("Canada", day(2, 8), 99).province("Ontario"),
        ])
        .await;

        let rows = db.region_statistics(&region("US")).await.unwrap();
        let provinces: Vec<_> = rows.iter().filter_map(|r| r.province.as_deref()).collect();
        assert_eq!(provinces, ["Texas"]);
    }

    #[tokio::test]
    async fn region_rolls_up_cities_into_provinces() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 10).province("New York").city("Albany").at(42.6, -73.0),
            Report::new("US", day(2, 8), 30).province("New York").city("Kings").at(40.6, -75.0),
            Report::new("US", day(2, 8), 20).province("Texas").city("Harris").at(29.8, -95.4),
        ])
        .await;

        let rows = db.region_statistics(&region("US")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].province.as_deref(), Some("New York"));
        assert_eq!(rows[0].confirmed, 40);
        assert_eq!(rows[0].latitude, Some(42.6));
        assert_eq!(rows[0].longitude, Some(-74.0));
        assert_eq!(rows[1].province.as_deref(), Some("Texas"));
    }

    #[tokio::test]
    async fn province_lists_named_cities() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 5).province("New York").city("Albany"),
            Report::new("US", day(2, 8), 50).province("New York").city("Kings"),
            Report::new("US", day(2, 8), 7).province("New York").city("Unassigned"),
            Report::new("US", day(2, 8), 0).province("New York").city("Essex").counters(0, 0, 0, 0),
            Report::new("US", day(1, 8), 80).province("New York").city("Queens"),
        ])
        .await;

        let filter = LocationFilter::from_path(&["US", "New York"]).unwrap();
        let rows = db.province_statistics(&filter).await.unwrap();
        let cities: Vec<_> = rows.iter().filter_map(|r| r.city.as_deref()).collect();
        assert_eq!(cities, ["Kings", "Albany"]);
    }

    #[tokio::test]
    async fn city_keeps_zero_rows() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 0).province("Alaska").city("Nome").counters(0, 0, 0, 0),
            Report::new("US", day(2, 8), 3).province("Alaska").city("Sitka"),
        ])
        .await;

        let filter = LocationFilter::from_path(&["US", "Alaska", "Nome"]).unwrap();
        let rows = db.city_statistics(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city.as_deref(), Some("Nome"));
        assert_eq!(rows[0].confirmed, 0);
    }

    #[tokio::test]
    async fn null_counters_sum_as_zero() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("Italy", day(2, 8), 10).counters(4, 10, 1, 2),
            Report::new("Italy", day(2, 9), 5).province("Lazio").only_confirmed(),
            Report::new("Nowhere", day(2, 9), 0).without_counters(),
        ])
        .await;

        let total = db.total_statistics().await.unwrap().unwrap();
        assert_eq!(
            (total.active, total.confirmed, total.deaths, total.recovered),
            (4, 15, 1, 2)
        );

        let world = db.world_statistics().await.unwrap();
        assert_eq!(world.len(), 1);
        assert_eq!(world[0].region, "Italy");
        assert_eq!(
            (world[0].active, world[0].confirmed, world[0].deaths, world[0].recovered),
            (4, 15, 1, 2)
        );

        let series = db.time_series(&LocationFilter::default()).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(
            (series[0].active, series[0].confirmed, series[0].deaths, series[0].recovered),
            (4, 15, 1, 2)
        );
    }

    #[tokio::test]
    async fn row_without_counters_is_kept_for_city_but_not_province() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 0).province("Alaska").city("Nome").without_counters(),
            Report::new("US", day(2, 8), 3).province("Alaska").city("Sitka"),
        ])
        .await;

        let nome = LocationFilter::from_path(&["US", "Alaska", "Nome"]).unwrap();
        let rows = db.city_statistics(&nome).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            (rows[0].active, rows[0].confirmed, rows[0].deaths, rows[0].recovered),
            (0, 0, 0, 0)
        );

        let alaska = LocationFilter::from_path(&["US", "Alaska"]).unwrap();
        let rows = db.province_statistics(&alaska).await.unwrap();
        let cities: Vec<_> = rows.iter().filter_map(|r| r.city.as_deref()).collect();
        assert_eq!(cities, ["Sitka"]);
    }

    #[tokio::test]
    async fn province_excludes_missing_and_nan_cities() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(2, 8), 50).province("New York").city("Kings"),
            Report::new("US", day(2, 8), 60).province("New York"),
            Report::new("US", day(2, 8), 70).province("New York").city("NaN"),
        ])
        .await;

        let filter = LocationFilter::from_path(&["US", "New York"]).unwrap();
        let rows = db.province_statistics(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].city.as_deref(), Some("Kings"));
    }

    #[tokio::test]
    async fn last_update_ignores_timestamp_layout() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("Italy", day(1, 8), 1).written_as("2020-03-01 08:00:00"),
            Report::new("US", day(2, 8), 10).province("NY"),
            Report::new("US", day(2, 20), 5)
                .province("NY")
                .written_as("2020-03-02 20:00:00"),
        ])
        .await;

        let total = db.total_statistics().await.unwrap().unwrap();
        assert_eq!(total.confirmed, 15);
        assert_eq!(total.last_update, day(2, 20));

        let rows = db.region_statistics(&region("US")).await.unwrap();
        assert_eq!(rows[0].last_update, day(2, 20));

        let world = db.world_statistics().await.unwrap();
        assert_eq!(world.len(), 1);
        assert_eq!(world[0].last_update, day(2, 20));
    }

    #[tokio::test]
    async fn time_series_groups_by_day() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(1, 8), 100).province("NY"),
            Report::new("US", day(1, 9), 20).province("CA"),
            Report::new("US", day(2, 8), 150).province("NY"),
            Report::new("Italy", day(2, 8), 999),
        ])
        .await;

        let filter = LocationFilter::from_pairs([("region", "US")]).unwrap();
        let rows = db.time_series(&filter).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].day.to_string(), "2020-03-02");
        assert_eq!(rows[0].confirmed, 150);
        assert_eq!(rows[1].day.to_string(), "2020-03-01");
        assert_eq!(rows[1].confirmed, 120);

        let everything = db.time_series(&LocationFilter::default()).await.unwrap();
        assert_eq!(everything[0].confirmed, 1149);
    }

    #[tokio::test]
    async fn time_series_filters_ignore_key_order() {
        let db = Database::in_memory().await;
        db.insert(&[
            Report::new("US", day(1, 8), 100).province("NY").city("Kings"),
            Report::new("US", day(1, 8), 7).province("NY").city("Albany"),
        ])
        .await;

        let a = LocationFilter::from_pairs([("city", "Kings"), ("region", "US")]).unwrap();
        let b = LocationFilter::from_pairs([("region", "US"), ("city", "Kings")]).unwrap();
        assert_eq!(db.time_series(&a).await.unwrap(), db.time_series(&b).await.unwrap());
    }

    #[tokio::test]
    async fn filter_values_are_not_interpreted_as_sql() {
        let db = Database::in_memory().await;
        db.insert(&[Report::new("US", day(1, 8), 100)]).await;

        let filter = LocationFilter::from_pairs([("region", "x' OR '1'='1")]).unwrap();
        assert!(db.time_series(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_operation_is_empty_on_empty_table() {
        let db = Database::in_memory().await;
        let city = LocationFilter::from_path(&["US", "NY", "Kings"]).unwrap();

        assert!(db.total_statistics().await.unwrap().is_none());
        assert!(db.world_statistics().await.unwrap().is_empty());
        assert!(db.region_statistics(&region("US")).await.unwrap().is_empty());
        assert!(db.province_statistics(&city).await.unwrap().is_empty());
        assert!(db.city_statistics(&city).await.unwrap().is_empty());
        assert!(db.time_series(&LocationFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_query_error() {
        let db = Database::in_memory().await;
        db.drop_reports_table().await;

        let err = db.world_statistics().await.unwrap_err();
        assert!(matches!(err, StatisticsError::QueryExecution(_)));
    }
}
