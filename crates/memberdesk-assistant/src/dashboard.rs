//! The membership dashboard's tool table.
//!
//! Tool schemas, the core subset and the topic clusters live here as data.
//! Handlers are supplied by the host: the assistant core never knows how a
//! member count or a refund card is actually produced.

use std::sync::Arc;

use crate::catalog::{
    ParameterKind, ParameterSchema, ToolCatalog, ToolCatalogBuilder, ToolDescriptor, ToolHandler,
    TopicCluster,
};
use crate::error::Result;

/// Tools offered with every message.
pub const CORE_TOOLS: &[&str] = &[
    "get_users_count",
    "search_users",
    "get_user_details",
    "get_dashboard_summary",
    "navigate_to",
];

fn period() -> ParameterKind {
    ParameterKind::Enum(
        ["week", "month", "quarter", "year"]
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

fn status(values: &[&str]) -> ParameterKind {
    ParameterKind::Enum(values.iter().map(|v| (*v).to_owned()).collect())
}

/// Name, description and parameters of every dashboard tool.
fn tool_schemas() -> Vec<(&'static str, &'static str, ParameterSchema)> {
    use ParameterKind::{Array, Boolean, Integer, Number, String as Text};

    vec![
        // -- Core -------------------------------------------------------------
        (
            "get_users_count",
            "Count members, optionally filtered by account status.",
            ParameterSchema::empty().optional(
                "status",
                status(&["active", "inactive", "suspended", "all"]),
                "Account status filter, defaults to all",
            ),
        ),
        (
            "search_users",
            "Search members by name, email or membership number.",
            ParameterSchema::empty()
                .required("query", Text, "Free-text search")
                .optional("limit", Integer, "Maximum results, defaults to 10"),
        ),
        (
            "get_user_details",
            "Full profile of one member including plan and contribution totals.",
            ParameterSchema::empty().required("user_id", Text, "Member id"),
        ),
        (
            "get_dashboard_summary",
            "Headline figures shown on the dashboard home page.",
            ParameterSchema::empty(),
        ),
        (
            "navigate_to",
            "Suggest a dashboard page for the administrator to open.",
            ParameterSchema::empty()
                .required(
                    "page",
                    status(&["users", "plans", "contributions", "campaigns", "reports", "settings"]),
                    "Target page",
                )
                .optional("record_id", Text, "Record to focus on that page"),
        ),
        // -- Finance ----------------------------------------------------------
        (
            "get_financial_kpis",
            "Revenue, recurring revenue and average contribution for a period.",
            ParameterSchema::empty().optional("period", period(), "Reporting period"),
        ),
        (
            "get_revenue_timeseries",
            "Revenue per interval, ready for charting.",
            ParameterSchema::empty()
                .required("period", period(), "Bucket size")
                .optional("points", Integer, "Number of buckets"),
        ),
        (
            "list_contributions",
            "Most recent contributions, optionally for one member.",
            ParameterSchema::empty()
                .optional("user_id", Text, "Restrict to one member")
                .optional("min_amount", Number, "Minimum amount")
                .optional("limit", Integer, "Maximum results"),
        ),
        (
            "get_contribution_stats",
            "Totals and averages of contributions grouped by type.",
            ParameterSchema::empty().optional("period", period(), "Reporting period"),
        ),
        // -- Subscriptions ----------------------------------------------------
        (
            "list_plans",
            "Every subscription plan with price and member count.",
            ParameterSchema::empty().optional("include_archived", Boolean, "Include archived plans"),
        ),
        (
            "get_plan_details",
            "One subscription plan with its benefits and pricing history.",
            ParameterSchema::empty().required("plan_id", Text, "Plan id"),
        ),
        (
            "get_subscription_breakdown",
            "Active subscriptions per plan.",
            ParameterSchema::empty(),
        ),
        (
            "list_expiring_subscriptions",
            "Subscriptions ending within the given number of days.",
            ParameterSchema::empty().optional("within_days", Integer, "Horizon, defaults to 30"),
        ),
        // -- Crowdfunding -----------------------------------------------------
        (
            "list_campaigns",
            "Crowdfunding campaigns with their goal and status.",
            ParameterSchema::empty().optional(
                "status",
                status(&["draft", "running", "ended"]),
                "Campaign status filter",
            ),
        ),
        (
            "get_campaign_progress",
            "Amount raised, backer count and days left for one campaign.",
            ParameterSchema::empty().required("campaign_id", Text, "Campaign id"),
        ),
        (
            "get_top_backers",
            "Largest backers of one campaign.",
            ParameterSchema::empty()
                .required("campaign_id", Text, "Campaign id")
                .optional("limit", Integer, "Maximum results"),
        ),
        // -- Charts -----------------------------------------------------------
        (
            "build_chart_data",
            "Shape a metric into labels and series for a chart widget.",
            ParameterSchema::empty()
                .required(
                    "metric",
                    status(&["revenue", "members", "contributions", "subscriptions"]),
                    "Metric to plot",
                )
                .required("chart_type", status(&["line", "bar", "pie"]), "Chart type")
                .optional("period", period(), "Bucket size"),
        ),
        (
            "get_member_growth",
            "New and lost members per interval.",
            ParameterSchema::empty().optional("period", period(), "Bucket size"),
        ),
        // -- Export -----------------------------------------------------------
        (
            "export_users_csv",
            "Prepare a CSV export of members.",
            ParameterSchema::empty()
                .optional("fields", Array, "Columns to include")
                .optional("status", status(&["active", "inactive", "all"]), "Status filter"),
        ),
        (
            "export_contributions_csv",
            "Prepare a CSV export of contributions in a date range.",
            ParameterSchema::empty()
                .optional("from", Text, "Start date (YYYY-MM-DD)")
                .optional("to", Text, "End date (YYYY-MM-DD)"),
        ),
        // -- Admin actions ----------------------------------------------------
        (
            "prepare_user_deactivation",
            "Prepare a confirmation card to deactivate a member account.",
            ParameterSchema::empty()
                .required("user_id", Text, "Member id")
                .optional("reason", Text, "Reason shown to the administrator"),
        ),
        (
            "prepare_user_deletion",
            "Prepare a confirmation card to permanently delete a member.",
            ParameterSchema::empty().required("user_id", Text, "Member id"),
        ),
        (
            "prepare_refund",
            "Prepare a confirmation card to refund a contribution.",
            ParameterSchema::empty()
                .required("contribution_id", Text, "Contribution id")
                .optional("amount", Number, "Partial amount, defaults to the full amount"),
        ),
        (
            "prepare_subscription_cancellation",
            "Prepare a confirmation card to cancel a member's subscription.",
            ParameterSchema::empty()
                .required("user_id", Text, "Member id")
                .optional("immediate", Boolean, "Cancel now instead of at period end"),
        ),
        // -- Growth -----------------------------------------------------------
        (
            "list_recent_signups",
            "Members who joined most recently.",
            ParameterSchema::empty()
                .optional("days", Integer, "Look-back window, defaults to 7")
                .optional("limit", Integer, "Maximum results"),
        ),
    ]
}

/// Topic clusters, in selection order.
pub fn topic_clusters() -> Vec<TopicCluster> {
    vec![
        TopicCluster::new(
            "finance",
            &["revenue", "income", "kpi", "financ", "contribution", "donation", "payment", "money"],
            &[
                "get_financial_kpis",
                "get_revenue_timeseries",
                "list_contributions",
                "get_contribution_stats",
            ],
        ),
        TopicCluster::new(
            "subscriptions",
            &["subscription", "subscri", "plans", "pricing", "renewal", "expir"],
            &[
                "list_plans",
                "get_plan_details",
                "get_subscription_breakdown",
                "list_expiring_subscriptions",
            ],
        ),
        TopicCluster::new(
            "crowdfunding",
            &["campaign", "crowdfund", "backer", "fundrais", "pledge"],
            &["list_campaigns", "get_campaign_progress", "get_top_backers"],
        ),
        TopicCluster::new(
            "charts",
            &["chart", "graph", "plot", "trend", "visuali", "timeseries"],
            &["build_chart_data", "get_revenue_timeseries", "get_member_growth"],
        ),
        TopicCluster::new(
            "export",
            &["export", "csv", "download", "spreadsheet"],
            &["export_users_csv", "export_contributions_csv"],
        ),
        TopicCluster::new(
            "admin_actions",
            &["delete", "remove", "deactivat", "suspend", "refund", "cancel"],
            &[
                "prepare_user_deactivation",
                "prepare_user_deletion",
                "prepare_refund",
                "prepare_subscription_cancellation",
            ],
        ),
        TopicCluster::new(
            "growth",
            &["growth", "signup", "sign-up", "sign up", "joined", "new members", "churn"],
            &["get_member_growth", "list_recent_signups"],
        ),
    ]
}

/// Build the dashboard catalog, asking `handler_for` for each tool's handler.
///
/// # Errors
///
/// Propagates [`crate::AssistantError::DuplicateTool`] and
/// [`crate::AssistantError::InvalidCatalog`] from the builder.
pub fn dashboard_catalog<F>(mut handler_for: F) -> Result<ToolCatalog>
where
    F: FnMut(&str) -> Arc<dyn ToolHandler>,
{
    let mut builder = ToolCatalogBuilder::new();
    for (name, description, parameters) in tool_schemas() {
        let handler = handler_for(name);
        builder.register(ToolDescriptor::new(name, description, parameters, handler))?;
    }
    builder.core(CORE_TOOLS.iter().copied());
    for cluster in topic_clusters() {
        builder.cluster(cluster);
    }
    builder.build()
}
