#![allow(dead_code)]

use std::sync::Arc;

use relation_dispatcher::{
    Catalog, Connection, ConnectionDescriptor, Constraint, Driver, EntityDef, Operator, RelationDef, ResolverConfig,
    StaticConnection,
};

/// Catalog over four connections:
///
/// - `primary`: hostA/app, may emit cross-database SQL
/// - `archive`: hostA/archive, table prefix `arc_`
/// - `reporting`: hostA/reporting, no cross-database capability
/// - `billing`: hostB/billing, answers owner-key fetches with `billing_rows`
pub struct Fixture {
    pub catalog: Catalog,
    pub primary: Arc<StaticConnection>,
    pub archive: Arc<StaticConnection>,
    pub reporting: Arc<StaticConnection>,
    pub billing: Arc<StaticConnection>,
}

pub struct Options {
    pub strict: bool,
    pub billing_rows: Vec<i64>,
    pub billing_failure: Option<&'static str>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict: false,
            billing_rows: vec![3, 7],
            billing_failure: None,
        }
    }
}

pub fn mysql(host: &str, database: &str) -> ConnectionDescriptor {
    ConnectionDescriptor::new(Driver::Mysql, host, 3306, database)
}

pub fn fixture() -> Fixture {
    fixture_with(Options::default())
}

pub fn fixture_with(options: Options) -> Fixture {
    let primary = Arc::new(StaticConnection::new(
        "primary",
        mysql("hostA", "app").with_cross_database(true),
    ));
    let archive = Arc::new(StaticConnection::new(
        "archive",
        mysql("hostA", "archive").with_table_prefix("arc_"),
    ));
    let reporting = Arc::new(StaticConnection::new("reporting", mysql("hostA", "reporting")));

    let mut billing = StaticConnection::new("billing", mysql("hostB", "billing")).with_rows(options.billing_rows);
    if let Some(message) = options.billing_failure {
        billing = billing.failing(message);
    }
    let billing = Arc::new(billing);

    let mut catalog = Catalog::new().with_resolver_config(ResolverConfig {
        strict_cross_connection: options.strict,
    });
    catalog
        .add_connection("primary", primary.clone() as Arc<dyn Connection>)
        .add_connection("archive", archive.clone() as Arc<dyn Connection>)
        .add_connection("reporting", reporting.clone() as Arc<dyn Connection>)
        .add_connection("billing", billing.clone() as Arc<dyn Connection>)
        .add_entity(
            "User",
            EntityDef::new("users", "primary")
                .relation("posts", RelationDef::has_many("Post", "user_id"))
                .relation("team", RelationDef::belongs_to("Team", "team_id"))
                .relation("manager", RelationDef::belongs_to("User", "manager_id"))
                .relation("invoices", RelationDef::has_many("Invoice", "user_id")),
        )
        .add_entity(
            "Post",
            EntityDef::new("posts", "primary")
                .morph_alias("post")
                .relation("comments", RelationDef::has_many("Comment", "post_id"))
                .relation(
                    "approvedComments",
                    RelationDef::has_many("Comment", "post_id")
                        .constraint(Constraint::new("approved", Operator::Eq, true)),
                )
                .relation("likes", RelationDef::has_many("Like", "post_id"))
                .relation("author", RelationDef::belongs_to("User", "user_id")),
        )
        .add_entity(
            "Comment",
            EntityDef::new("comments", "archive")
                .relation("post", RelationDef::belongs_to("Post", "post_id"))
                .relation("author", RelationDef::belongs_to("User", "user_id")),
        )
        .add_entity("Like", EntityDef::new("likes", "primary"))
        .add_entity(
            "Team",
            EntityDef::new("teams", "billing")
                .morph_alias("team")
                .relation("members", RelationDef::has_many("User", "team_id"))
                .relation("owner", RelationDef::belongs_to("User", "owner_id")),
        )
        .add_entity("Invoice", EntityDef::new("invoices", "billing"))
        .add_entity(
            "Image",
            EntityDef::new("images", "primary")
                .relation("imageable", RelationDef::morph_to("imageable_id", "imageable_type")),
        )
        .add_entity(
            "Report",
            EntityDef::new("reports", "reporting").relation("comments", RelationDef::has_many("Comment", "report_id")),
        );

    Fixture {
        catalog,
        primary,
        archive,
        reporting,
        billing,
    }
}
