use std::sync::Arc;

use relation_dispatcher::{
    Boolean, Catalog, CatalogConfig, Connection, ConnectionDescriptor, CountRelation, Operator, Query, Result,
    StaticConnection,
};
use tracing_subscriber::EnvFilter;

/// 加载目录配置，优先使用JSON配置，失败时使用演示配置
fn load_config() -> CatalogConfig {
    match CatalogConfig::from_json_file("catalog.json") {
        Ok(config) => {
            println!("✅ 成功从JSON配置文件加载目录");
            config
        }
        Err(e) => {
            println!("⚠️ 无法加载JSON配置文件 ({}), 使用演示配置", e);
            CatalogConfig::demo()
        }
    }
}

/// 演示用连接：不连接真实数据库，远程查询返回固定的主键
fn demo_connection(name: &str, descriptor: &ConnectionDescriptor) -> Arc<dyn Connection> {
    let connection = StaticConnection::new(name, descriptor.clone());
    match name {
        "billing" => Arc::new(connection.with_rows([3i64, 7, 12])),
        _ => Arc::new(connection.with_rows([1i64, 2])),
    }
}

fn print_query(title: &str, query: &Query<'_>) -> Result<()> {
    println!("\n[{}]", title);
    println!("{}", query.to_sql()?);
    if !query.dispatches().is_empty() {
        println!("分派策略:");
        for dispatch in query.dispatches() {
            println!("  • {} => {:?}", dispatch.relation, dispatch.strategy);
        }
    }
    Ok(())
}

fn run(catalog: &Catalog) -> Result<()> {
    // 1. 同库关系：普通相关子查询
    let mut query = catalog.query("User")?;
    query.has("posts", Operator::Gte, 1, Boolean::And, None)?;
    print_query("场景1: 同库 has(posts)", &query)?;

    // 2. 同主机不同库：子查询FROM使用跨库标记
    let mut query = catalog.query("Post")?;
    query.where_has("comments", |q| {
        q.where_col("body", Operator::Eq, "hello");
        Ok(())
    })?;
    print_query("场景2: 跨库 where_has(comments)", &query)?;

    // 3. 不同主机的belongs_to：先查主键，再用IN查询
    let mut query = catalog.query("User")?;
    query.has("team", Operator::Gte, 1, Boolean::And, None)?.doesnt_have("manager")?;
    print_query("场景3: 跨主机 has(team) 与自关联 doesnt_have(manager)", &query)?;

    // 4. 嵌套路径
    let mut query = catalog.query("User")?;
    query.has("posts.comments", Operator::Gte, 2, Boolean::And, None)?;
    print_query("场景4: 嵌套 has(posts.comments, >=, 2)", &query)?;

    // 5. 计数列
    let mut query = catalog.query("Post")?;
    query.with_count([
        CountRelation::from("comments"),
        CountRelation::from("approvedComments as approved"),
        CountRelation::from("author"),
    ])?;
    print_query("场景5: with_count", &query)?;

    // 6. 多态关系
    let mut query = catalog.query("Image")?;
    query.has_morph("imageable", &["Post", "Team"], Operator::Gte, 1, Boolean::And)?;
    print_query("场景6: has_morph(imageable, [Post, Team])", &query)?;

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("--- Relation Dispatcher: 跨连接关系查询 ---");

    let config = load_config();
    println!("\n[配置信息]:");
    println!("✅ 加载了 {} 个连接, {} 个实体", config.connections.len(), config.entities.len());
    for (name, connection) in &config.connections {
        println!(
            "  {} -> {:?} {}:{}/{}",
            name, connection.driver, connection.host, connection.port, connection.database
        );
    }

    let catalog = match Catalog::from_config(config, demo_connection) {
        Ok(catalog) => catalog,
        Err(e) => {
            println!("❌ 目录构建失败: {}", e);
            return;
        }
    };

    if let Err(e) = run(&catalog) {
        println!("✗ 查询构建失败: {}", e);
    }
}
