use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

use crate::orders::{has_recurrence_signal, Order, OrderError, OrderStatus, ScheduleStatus};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Raw listing parameters as received over HTTP
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecurringOrderQuery {
    /// "active", "paused" or "ended"
    pub schedule_status: Option<String>,
    pub customer_id: Option<Uuid>,
    pub order_status: Option<String>,
    /// Inclusive lower bound on the creation day
    pub created_from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation day
    pub created_to: Option<NaiveDate>,
    /// Matches order number, customer name, item name or SKU
    pub search: Option<String>,
    /// "created_at", "total", "next_delivery_at" or "order_number"
    pub sort: Option<String>,
    /// "asc" or "desc"
    pub order: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Total,
    NextDeliveryAt,
    OrderNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Which recurring orders a listing covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecurringOrderFilter {
    pub schedule_status: Option<ScheduleStatus>,
    pub customer_id: Option<Uuid>,
    pub order_status: Option<OrderStatus>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    /// Lowercased, trimmed search term
    pub search: Option<String>,
}

/// Validated and normalized listing parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRecurringQuery {
    pub filter: RecurringOrderFilter,
    pub sort_field: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl ValidatedRecurringQuery {
    /// Rows to skip before the current page
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }

    /// `ORDER BY` clause equivalent to `sort_orders`
    ///
    /// Orders without a next delivery date come last in both directions and
    /// ties fall back to the order number in byte order.
    pub fn order_by_sql(&self) -> String {
        let direction = match self.sort_order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let primary = match self.sort_field {
            SortField::CreatedAt => format!("created_at {}", direction),
            SortField::Total => format!("total {}", direction),
            SortField::OrderNumber => format!("order_number COLLATE \"C\" {}", direction),
            SortField::NextDeliveryAt => format!("next_delivery_at {} NULLS LAST", direction),
        };

        format!("{}, order_number COLLATE \"C\" ASC", primary)
    }

    /// One page of matching rows, sorted and limited in the database
    pub fn to_page_sql(&self, columns: &str) -> (String, Vec<SqlParam>) {
        let (clause, params) = self.filter.to_sql();
        let sql = format!(
            "SELECT {} FROM orders WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            columns,
            clause,
            self.order_by_sql(),
            self.limit,
            self.offset()
        );
        (sql, params)
    }

    /// Count, per-schedule counts and value of every matching row
    pub fn to_summary_sql(&self) -> (String, Vec<SqlParam>) {
        let (clause, params) = self.filter.to_sql();
        let sql = format!(
            "SELECT COUNT(*) AS total, \
             COUNT(*) FILTER (WHERE schedule_status = 'active') AS active, \
             COUNT(*) FILTER (WHERE schedule_status = 'paused') AS paused, \
             COUNT(*) FILTER (WHERE schedule_status = 'ended') AS ended, \
             COALESCE(SUM(total), 0) AS total_value \
             FROM orders WHERE {}",
            clause
        );
        (sql, params)
    }
}

pub struct QueryValidator;

impl QueryValidator {
    /// Validate and normalize listing parameters
    ///
    /// Defaults: sort by `created_at` descending, page 1, limit 20.
    pub fn validate(params: RecurringOrderQuery) -> Result<ValidatedRecurringQuery, OrderError> {
        let schedule_status = params
            .schedule_status
            .as_deref()
            .and_then(Self::non_blank)
            .map(Self::parse_schedule_status)
            .transpose()?;

        let order_status = params
            .order_status
            .as_deref()
            .and_then(Self::non_blank)
            .map(Self::parse_order_status)
            .transpose()?;

        if let (Some(from), Some(to)) = (params.created_from, params.created_to) {
            if from > to {
                return Err(OrderError::ValidationError(
                    "created_from cannot be later than created_to".to_string(),
                ));
            }
        }

        let sort_field = match params.sort.as_deref().and_then(Self::non_blank) {
            Some(raw) => Self::parse_sort_field(raw)?,
            None => SortField::CreatedAt,
        };

        let sort_order = match params.order.as_deref().and_then(Self::non_blank) {
            Some(raw) => Self::parse_sort_order(raw)?,
            None => SortOrder::Desc,
        };

        let page = params.page.unwrap_or(1);
        if page == 0 {
            return Err(OrderError::ValidationError(
                "page must be a positive number (greater than 0)".to_string(),
            ));
        }

        let limit = params.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(OrderError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }

        Ok(ValidatedRecurringQuery {
            filter: RecurringOrderFilter {
                schedule_status,
                customer_id: params.customer_id,
                order_status,
                created_from: params.created_from,
                created_to: params.created_to,
                search: params
                    .search
                    .as_deref()
                    .and_then(Self::non_blank)
                    .map(str::to_lowercase),
            },
            sort_field,
            sort_order,
            page,
            limit,
        })
    }

    fn non_blank(value: &str) -> Option<&str> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    fn parse_schedule_status(s: &str) -> Result<ScheduleStatus, OrderError> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ScheduleStatus::Active),
            "paused" => Ok(ScheduleStatus::Paused),
            "ended" => Ok(ScheduleStatus::Ended),
            _ => Err(OrderError::ValidationError(format!(
                "Invalid schedule status '{}'. Must be 'active', 'paused' or 'ended'",
                s
            ))),
        }
    }

    fn parse_order_status(s: &str) -> Result<OrderStatus, OrderError> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase())).map_err(|_| {
            OrderError::ValidationError(format!("Invalid order status '{}'", s))
        })
    }

    fn parse_sort_field(s: &str) -> Result<SortField, OrderError> {
        match s.to_lowercase().as_str() {
            "created_at" => Ok(SortField::CreatedAt),
            "total" => Ok(SortField::Total),
            "next_delivery_at" => Ok(SortField::NextDeliveryAt),
            "order_number" => Ok(SortField::OrderNumber),
            _ => Err(OrderError::ValidationError(format!(
                "Invalid sort field '{}'. Must be 'created_at', 'total', 'next_delivery_at' or 'order_number'",
                s
            ))),
        }
    }

    fn parse_sort_order(s: &str) -> Result<SortOrder, OrderError> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(OrderError::ValidationError(format!(
                "Invalid sort order '{}'. Must be 'asc' or 'desc'",
                s
            ))),
        }
    }
}

impl RecurringOrderFilter {
    /// In-memory evaluation of the filter
    pub fn matches(&self, order: &Order) -> bool {
        if !has_recurrence_signal(order.is_recurring, order.recurrence.as_ref()) {
            return false;
        }
        if self.schedule_status.is_some() && order.schedule_status != self.schedule_status {
            return false;
        }
        if self.customer_id.map_or(false, |id| order.customer_id != id) {
            return false;
        }
        if self.order_status.map_or(false, |status| order.status != status) {
            return false;
        }

        let created = order.created_at.date_naive();
        if self.created_from.map_or(false, |from| created < from) {
            return false;
        }
        if self.created_to.map_or(false, |to| created > to) {
            return false;
        }

        match &self.search {
            Some(term) => Self::search_matches(order, term),
            None => true,
        }
    }

    fn search_matches(order: &Order, term: &str) -> bool {
        let contains = |value: &str| value.to_lowercase().contains(term);

        contains(&order.order_number)
            || contains(&order.customer_name)
            || order
                .items
                .iter()
                .any(|item| contains(&item.name) || contains(&item.sku))
    }

    /// Equivalent SQL WHERE clause over the `orders` table
    pub fn to_sql(&self) -> (String, Vec<SqlParam>) {
        let mut builder = SqlFilterBuilder::new();
        builder.push_raw("(is_recurring OR recurrence IS NOT NULL)");

        if let Some(status) = self.schedule_status {
            builder.push("schedule_status = ${}", SqlParam::Text(status.as_str().to_string()));
        }
        if let Some(customer_id) = self.customer_id {
            builder.push("customer_id = ${}", SqlParam::Uuid(customer_id));
        }
        if let Some(status) = self.order_status {
            builder.push("status = ${}", SqlParam::Text(status.as_str().to_string()));
        }
        if let Some(from) = self.created_from {
            builder.push("(created_at AT TIME ZONE 'UTC')::date >= ${}", SqlParam::Date(from));
        }
        if let Some(to) = self.created_to {
            builder.push("(created_at AT TIME ZONE 'UTC')::date <= ${}", SqlParam::Date(to));
        }
        if let Some(term) = &self.search {
            builder.push(
                "(order_number ILIKE ${0} OR customer_name ILIKE ${0} OR EXISTS (\
                 SELECT 1 FROM jsonb_array_elements(items) AS item \
                 WHERE item->>'name' ILIKE ${0} OR item->>'sku' ILIKE ${0}))",
                SqlParam::Text(format!("%{}%", escape_like(term))),
            );
        }

        builder.build()
    }
}

/// Bound parameter of a generated SQL clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
}

/// Collects AND-ed WHERE clauses with positional parameters
struct SqlFilterBuilder {
    where_clauses: Vec<String>,
    params: Vec<SqlParam>,
}

impl SqlFilterBuilder {
    fn new() -> Self {
        Self {
            where_clauses: Vec::new(),
            params: Vec::new(),
        }
    }

    fn push_raw(&mut self, clause: &str) {
        self.where_clauses.push(clause.to_string());
    }

    /// `${}` and `${0}` in the template become the next parameter index
    fn push(&mut self, template: &str, param: SqlParam) {
        let param_index = self.params.len() + 1;
        let placeholder = format!("${}", param_index);
        self.where_clauses
            .push(template.replace("${0}", &placeholder).replace("${}", &placeholder));
        self.params.push(param);
    }

    fn build(self) -> (String, Vec<SqlParam>) {
        let clause = if self.where_clauses.is_empty() {
            "TRUE".to_string()
        } else {
            self.where_clauses.join(" AND ")
        };
        (clause, self.params)
    }
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = ((total + limit as u64 - 1) / limit as u64) as u32;
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Aggregates over every order matching the filter, not only the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecurringOrderAnalytics {
    pub total_recurring_orders: u64,
    pub active_orders: u64,
    pub paused_orders: u64,
    pub ended_orders: u64,
    pub total_value: Decimal,
    pub average_order_value: Decimal,
}

impl RecurringOrderAnalytics {
    pub fn compute(orders: &[Order]) -> Self {
        let count_schedule = |status: ScheduleStatus| {
            orders
                .iter()
                .filter(|o| o.schedule_status == Some(status))
                .count() as u64
        };

        Self::from_counts(
            orders.len() as u64,
            count_schedule(ScheduleStatus::Active),
            count_schedule(ScheduleStatus::Paused),
            count_schedule(ScheduleStatus::Ended),
            orders.iter().map(|o| o.total).sum(),
        )
    }

    /// Build analytics from pre-aggregated counts, e.g. a SQL summary row
    pub fn from_counts(total: u64, active: u64, paused: u64, ended: u64, total_value: Decimal) -> Self {
        let average_order_value = if total == 0 {
            Decimal::ZERO
        } else {
            (total_value / Decimal::from(total)).round_dp(2)
        };

        Self {
            total_recurring_orders: total,
            active_orders: active,
            paused_orders: paused,
            ended_orders: ended,
            total_value,
            average_order_value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringOrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
    pub analytics: RecurringOrderAnalytics,
}

impl RecurringOrderPage {
    /// Sort, paginate and summarize an already-filtered set of orders
    pub fn assemble(mut orders: Vec<Order>, query: &ValidatedRecurringQuery) -> Self {
        let analytics = RecurringOrderAnalytics::compute(&orders);
        sort_orders(&mut orders, query.sort_field, query.sort_order);

        let pagination = Pagination::new(query.page, query.limit, orders.len() as u64);
        let page_orders = orders
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();

        Self {
            orders: page_orders,
            pagination,
            analytics,
        }
    }
}

/// Sort in place; orders without a next delivery date always come last
pub fn sort_orders(orders: &mut [Order], field: SortField, order: SortOrder) {
    let directed = |ordering: Ordering| match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    };

    orders.sort_by(|a, b| {
        let primary = match field {
            SortField::CreatedAt => directed(a.created_at.cmp(&b.created_at)),
            SortField::Total => directed(a.total.cmp(&b.total)),
            SortField::OrderNumber => directed(a.order_number.cmp(&b.order_number)),
            SortField::NextDeliveryAt => match (a.next_delivery_at, b.next_delivery_at) {
                (Some(x), Some(y)) => directed(x.cmp(&y)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        };
        primary.then_with(|| a.order_number.cmp(&b.order_number))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::schedule_machine::tests::recurring_order;
    use crate::orders::LineItem;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn order(number: &str, total: Decimal, schedule: ScheduleStatus, day: u32) -> Order {
        let mut order = recurring_order(schedule);
        order.order_number = number.to_string();
        order.total = total;
        order.created_at = Utc.with_ymd_and_hms(2024, 1, day, 10, 0, 0).unwrap();
        order
    }

    #[test]
    fn test_validate_defaults() {
        let query = QueryValidator::validate(RecurringOrderQuery::default()).unwrap();
        assert_eq!(query.sort_field, SortField::CreatedAt);
        assert_eq!(query.sort_order, SortOrder::Desc);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, DEFAULT_PAGE_LIMIT);
        assert_eq!(query.filter, RecurringOrderFilter::default());
    }

    #[test]
    fn test_validate_rejects_bad_params() {
        let cases = vec![
            RecurringOrderQuery { page: Some(0), ..Default::default() },
            RecurringOrderQuery { limit: Some(0), ..Default::default() },
            RecurringOrderQuery { limit: Some(101), ..Default::default() },
            RecurringOrderQuery { sort: Some("price".to_string()), ..Default::default() },
            RecurringOrderQuery { order: Some("up".to_string()), ..Default::default() },
            RecurringOrderQuery { schedule_status: Some("sleeping".to_string()), ..Default::default() },
            RecurringOrderQuery { order_status: Some("lost".to_string()), ..Default::default() },
            RecurringOrderQuery {
                created_from: NaiveDate::from_ymd_opt(2024, 2, 1),
                created_to: NaiveDate::from_ymd_opt(2024, 1, 1),
                ..Default::default()
            },
        ];

        for params in cases {
            assert!(
                matches!(QueryValidator::validate(params.clone()), Err(OrderError::ValidationError(_))),
                "{:?} should be rejected",
                params
            );
        }
    }

    #[test]
    fn test_validate_normalizes_values() {
        let query = QueryValidator::validate(RecurringOrderQuery {
            schedule_status: Some("Paused".to_string()),
            order_status: Some("SHIPPED".to_string()),
            search: Some("  Beans ".to_string()),
            sort: Some("total".to_string()),
            order: Some("ASC".to_string()),
            limit: Some(100),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(query.filter.schedule_status, Some(ScheduleStatus::Paused));
        assert_eq!(query.filter.order_status, Some(OrderStatus::Shipped));
        assert_eq!(query.filter.search.as_deref(), Some("beans"));
        assert_eq!(query.sort_field, SortField::Total);
        assert_eq!(query.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_filter_excludes_one_time_orders() {
        let mut one_time = order("RO-1", dec!(10), ScheduleStatus::Active, 1);
        one_time.is_recurring = false;
        one_time.schedule_status = None;

        assert!(!RecurringOrderFilter::default().matches(&one_time));
        assert!(RecurringOrderFilter::default().matches(&order("RO-2", dec!(10), ScheduleStatus::Active, 1)));
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let mut subject = order("RO-20240101-AAAAAA", dec!(10), ScheduleStatus::Active, 1);
        subject.items.push(LineItem {
            product_id: Uuid::new_v4(),
            sku: "BEAN-ETH-1KG".to_string(),
            name: "Ethiopian Beans".to_string(),
            quantity: 1,
            unit_price: dec!(10),
            line_total: dec!(10),
        });

        for term in ["ethiopian", "bean-eth", "aaaaaa", "test customer"] {
            let filter = RecurringOrderFilter {
                search: Some(term.to_string()),
                ..Default::default()
            };
            assert!(filter.matches(&subject), "search '{}' should match", term);
        }

        let filter = RecurringOrderFilter {
            search: Some("decaf".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&subject));
    }

    #[test]
    fn test_filter_date_range_is_inclusive() {
        let subject = order("RO-1", dec!(10), ScheduleStatus::Active, 15);
        let filter = RecurringOrderFilter {
            created_from: NaiveDate::from_ymd_opt(2024, 1, 15),
            created_to: NaiveDate::from_ymd_opt(2024, 1, 15),
            ..Default::default()
        };
        assert!(filter.matches(&subject));

        let later = RecurringOrderFilter {
            created_from: NaiveDate::from_ymd_opt(2024, 1, 16),
            ..Default::default()
        };
        assert!(!later.matches(&subject));
    }

    #[test]
    fn test_sql_clause_numbers_parameters() {
        let filter = RecurringOrderFilter {
            schedule_status: Some(ScheduleStatus::Active),
            customer_id: Some(Uuid::nil()),
            search: Some("50%".to_string()),
            ..Default::default()
        };

        let (clause, params) = filter.to_sql();
        assert!(clause.starts_with("(is_recurring OR recurrence IS NOT NULL)"));
        assert!(clause.contains("schedule_status = $1"));
        assert!(clause.contains("customer_id = $2"));
        assert!(clause.contains("order_number ILIKE $3"));
        assert!(clause.contains("item->>'sku' ILIKE $3"));
        assert_eq!(params.len(), 3);
        assert_eq!(params[2], SqlParam::Text("%50\\%%".to_string()));
    }

    #[test]
    fn test_page_sql_sorts_and_limits_in_database() {
        let query = QueryValidator::validate(RecurringOrderQuery {
            schedule_status: Some("active".to_string()),
            sort: Some("next_delivery_at".to_string()),
            order: Some("desc".to_string()),
            page: Some(3),
            limit: Some(25),
            ..Default::default()
        })
        .unwrap();

        let (sql, params) = query.to_page_sql("id, total");
        assert!(sql.starts_with("SELECT id, total FROM orders WHERE (is_recurring"));
        assert!(sql.contains("schedule_status = $1"));
        assert!(sql.ends_with(
            "ORDER BY next_delivery_at DESC NULLS LAST, order_number COLLATE \"C\" ASC LIMIT 25 OFFSET 50"
        ));
        assert_eq!(params, vec![SqlParam::Text("active".to_string())]);

        let defaults = QueryValidator::validate(RecurringOrderQuery::default()).unwrap();
        assert_eq!(defaults.offset(), 0);
        assert_eq!(
            defaults.order_by_sql(),
            "created_at DESC, order_number COLLATE \"C\" ASC"
        );
    }

    #[test]
    fn test_summary_sql_shares_page_filter() {
        let query = QueryValidator::validate(RecurringOrderQuery {
            customer_id: Some(uuid::Uuid::nil()),
            ..Default::default()
        })
        .unwrap();

        let (summary, summary_params) = query.to_summary_sql();
        let (page, page_params) = query.to_page_sql("id");

        assert!(summary.starts_with("SELECT COUNT(*) AS total,"));
        assert!(summary.contains("COUNT(*) FILTER (WHERE schedule_status = 'paused') AS paused"));
        assert!(summary.contains("COALESCE(SUM(total), 0) AS total_value"));
        assert!(summary.ends_with("customer_id = $1"));
        assert!(!summary.contains("LIMIT"));
        assert!(page.contains("customer_id = $1"));
        assert_eq!(summary_params, page_params);
    }

    #[test]
    fn test_analytics_from_counts_matches_compute() {
        let orders = vec![
            order("RO-A", dec!(10.00), ScheduleStatus::Active, 1),
            order("RO-B", dec!(20.00), ScheduleStatus::Active, 2),
            order("RO-C", dec!(5.00), ScheduleStatus::Paused, 3),
        ];

        assert_eq!(
            RecurringOrderAnalytics::from_counts(3, 2, 1, 0, dec!(35.00)),
            RecurringOrderAnalytics::compute(&orders)
        );
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
        assert_eq!(Pagination::new(1, 20, 41).total_pages, 3);
    }

    #[test]
    fn test_page_assembly_and_analytics() {
        let orders = vec![
            order("RO-A", dec!(10.00), ScheduleStatus::Active, 1),
            order("RO-B", dec!(20.00), ScheduleStatus::Paused, 2),
            order("RO-C", dec!(35.00), ScheduleStatus::Ended, 3),
        ];
        let query = QueryValidator::validate(RecurringOrderQuery {
            limit: Some(2),
            page: Some(2),
            ..Default::default()
        })
        .unwrap();

        let page = RecurringOrderPage::assemble(orders, &query);

        // created_at desc: C, B | A
        assert_eq!(page.orders.len(), 1);
        assert_eq!(page.orders[0].order_number, "RO-A");
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);

        assert_eq!(page.analytics.total_recurring_orders, 3);
        assert_eq!(page.analytics.active_orders, 1);
        assert_eq!(page.analytics.paused_orders, 1);
        assert_eq!(page.analytics.ended_orders, 1);
        assert_eq!(page.analytics.total_value, dec!(65.00));
        assert_eq!(page.analytics.average_order_value, dec!(21.67));
    }

    #[test]
    fn test_empty_analytics() {
        let analytics = RecurringOrderAnalytics::compute(&[]);
        assert_eq!(analytics.total_recurring_orders, 0);
        assert_eq!(analytics.average_order_value, Decimal::ZERO);
    }

    #[test]
    fn test_missing_next_delivery_sorts_last() {
        let mut dated = order("RO-A", dec!(1), ScheduleStatus::Active, 1);
        dated.next_delivery_at = NaiveDate::from_ymd_opt(2024, 2, 1);
        let mut undated = order("RO-B", dec!(1), ScheduleStatus::Ended, 1);
        undated.next_delivery_at = None;

        for direction in [SortOrder::Asc, SortOrder::Desc] {
            let mut orders = vec![undated.clone(), dated.clone()];
            sort_orders(&mut orders, SortField::NextDeliveryAt, direction);
            assert_eq!(orders[0].order_number, "RO-A");
        }
    }
}
