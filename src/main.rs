//! ReadyAimGo 通知子系统 CLI
//!
//! 管理通知记录、模板与推送订阅，并查看统计指标

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use readyaimgo_notify::{
    Category, MissingTemplatePolicy, NotificationInput, NotificationService, NotificationType,
    ServiceConfig, TemplateInput,
};

#[derive(Parser)]
#[command(name = "ragn")]
#[command(about = "ReadyAimGo 通知子系统 - 发送、查询与统计通知")]
#[command(version)]
struct Cli {
    /// Dry-run 模式（分发只记录不发送）
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 直接发送一条通知
    Send {
        /// 标题
        title: String,
        /// 描述
        description: String,
        /// 类型 (info/success/warning/error)
        #[arg(long, short = 't', default_value = "info")]
        r#type: String,
        /// 分类 (job/payment/operator/system/network/marketing)
        #[arg(long, short, default_value = "system")]
        category: String,
        /// 只投递不保留
        #[arg(long)]
        transient: bool,
        /// 点击跳转地址
        #[arg(long)]
        action_url: Option<String>,
        /// 跳转按钮文案
        #[arg(long)]
        action_label: Option<String>,
    },
    /// 从模板发送通知
    SendTemplate {
        /// 模板 ID
        template_id: String,
        /// 模板变量，形如 key=value，可重复
        #[arg(long = "var", short = 'v')]
        vars: Vec<String>,
        /// 模板不存在时静默跳过（默认报错）
        #[arg(long)]
        ignore_missing: bool,
    },
    /// 列出通知记录（最新在前）
    List {
        /// 只显示未读
        #[arg(long)]
        unread: bool,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 标记单条通知为已读
    MarkRead {
        /// 通知 ID
        id: String,
    },
    /// 标记所有通知为已读
    MarkAllRead,
    /// 删除指定通知
    Delete {
        /// 通知 ID
        id: String,
    },
    /// 管理通知模板
    Templates {
        #[command(subcommand)]
        action: TemplateAction,
    },
    /// 查看统计指标
    Metrics {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 管理推送订阅
    Push {
        #[command(subcommand)]
        action: PushAction,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// 列出所有模板
    List {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 创建模板
    Create {
        /// 模板名称
        name: String,
        /// 标题模板，可含 {variable} 占位符
        title: String,
        /// 描述模板，可含 {variable} 占位符
        description: String,
        /// 类型 (info/success/warning/error)
        #[arg(long, short = 't', default_value = "info")]
        r#type: String,
        /// 分类 (job/payment/operator/system/network/marketing)
        #[arg(long, short, default_value = "system")]
        category: String,
        /// 声明的变量名，可重复
        #[arg(long = "variable")]
        variables: Vec<String>,
        /// 跳转地址模板
        #[arg(long)]
        action_url: Option<String>,
        /// 跳转按钮文案
        #[arg(long)]
        action_label: Option<String>,
        /// 标签，可重复
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// 删除模板
    Delete {
        /// 模板 ID
        id: String,
    },
}

#[derive(Subcommand)]
enum PushAction {
    /// 启用推送（申请权限并订阅）
    Enable,
    /// 停用推送（退订）
    Disable,
    /// 查看订阅状态
    Status,
}

fn parse_type(s: &str) -> Result<NotificationType> {
    match s {
        "info" => Ok(NotificationType::Info),
        "success" => Ok(NotificationType::Success),
        "warning" => Ok(NotificationType::Warning),
        "error" => Ok(NotificationType::Error),
        other => Err(anyhow!("未知类型: {}，可选: info, success, warning, error", other)),
    }
}

fn parse_category(s: &str) -> Result<Category> {
    match s {
        "job" => Ok(Category::Job),
        "payment" => Ok(Category::Payment),
        "operator" => Ok(Category::Operator),
        "system" => Ok(Category::System),
        "network" => Ok(Category::Network),
        "marketing" => Ok(Category::Marketing),
        other => Err(anyhow!(
            "未知分类: {}，可选: job, payment, operator, system, network, marketing",
            other
        )),
    }
}

fn parse_vars(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut vars = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("变量格式应为 key=value: {}", pair))?;
        vars.insert(key.to_string(), value.to_string());
    }
    Ok(vars)
}

fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("readyaimgo_notify=info,ragn=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    let mut config = ServiceConfig::detect()?;
    if cli.dry_run {
        config.dry_run = true;
    }
    if let Commands::SendTemplate { ignore_missing: true, .. } = &cli.command {
        config.missing_template = MissingTemplatePolicy::Ignore;
    }

    let mut service = NotificationService::new(config)?;
    service.init()?;

    match cli.command {
        Commands::Send {
            title,
            description,
            r#type,
            category,
            transient,
            action_url,
            action_label,
        } => {
            let mut input = NotificationInput::new(
                title,
                description,
                parse_type(&r#type)?,
                parse_category(&category)?,
            )
            .with_persistent(!transient);
            input.action_url = action_url;
            input.action_label = action_label;

            let notification = service.add_notification(input)?;
            println!("已发送通知: {}", notification.id);
            for record in service.delivery_log() {
                println!("  {} -> {}", record.channel, record.status);
            }
        }
        Commands::SendTemplate { template_id, vars, .. } => {
            let vars = parse_vars(&vars)?;
            match service.send_from_template(&template_id, &vars)? {
                Some(notification) => {
                    println!("已发送通知: {}", notification.id);
                    println!("  标题: {}", notification.title);
                }
                None => println!("模板 {} 不存在，已跳过", template_id),
            }
        }
        Commands::List { unread, json } => {
            let notifications: Vec<_> = service
                .list_notifications()
                .iter()
                .filter(|n| !unread || !n.read)
                .cloned()
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&notifications)?);
            } else if notifications.is_empty() {
                println!("没有通知");
            } else {
                println!("共 {} 条通知（未读 {}）:\n", notifications.len(), service.unread_count());
                for n in notifications {
                    let read_mark = if n.read { " " } else { "●" };
                    println!(
                        "{} [{}] {} | {} | {}",
                        read_mark,
                        n.category,
                        n.id,
                        n.created_at.format("%Y-%m-%d %H:%M"),
                        n.title
                    );
                }
            }
        }
        Commands::MarkRead { id } => {
            service.mark_as_read(&id)?;
            println!("已标记为已读: {}", id);
        }
        Commands::MarkAllRead => {
            service.mark_all_as_read()?;
            println!("已全部标记为已读");
        }
        Commands::Delete { id } => {
            service.delete_notification(&id)?;
            println!("已删除通知: {}", id);
        }
        Commands::Templates { action } => match action {
            TemplateAction::List { json } => {
                let templates = service.list_templates();
                if json {
                    println!("{}", serde_json::to_string_pretty(templates)?);
                } else if templates.is_empty() {
                    println!("没有模板");
                } else {
                    println!("共 {} 个模板:\n", templates.len());
                    for t in templates {
                        println!(
                            "  {} | {} | 分类: {} | 已使用 {} 次",
                            t.id, t.name, t.category, t.usage_count
                        );
                    }
                }
            }
            TemplateAction::Create {
                name,
                title,
                description,
                r#type,
                category,
                variables,
                action_url,
                action_label,
                tags,
            } => {
                let template = service.create_template(TemplateInput {
                    name,
                    category: parse_category(&category)?,
                    notification_type: parse_type(&r#type)?,
                    title,
                    description,
                    action_label,
                    action_url,
                    variables,
                    tags,
                })?;
                println!("已创建模板: {}", template.id);
            }
            TemplateAction::Delete { id } => {
                service.delete_template(&id)?;
                println!("已删除模板: {}", id);
            }
        },
        Commands::Metrics { json } => {
            let metrics = service.metrics();
            if json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("总计: {} 发送 / {} 曝光 / {} 点击", metrics.total_sent, metrics.total_viewed, metrics.total_clicked);
                println!("阅读率: {:.1}%", metrics.read_rate);
                println!("点击率: {:.1}%", metrics.click_through_rate);
                println!("参与率: {:.1}%", metrics.engagement_rate);
                println!("\n最近 7 天:");
                for day in &metrics.daily {
                    println!("  {} | 发送 {} | 曝光 {} | 点击 {}", day.date, day.sent, day.viewed, day.clicked);
                }
                if !metrics.top_categories.is_empty() {
                    println!("\n分类排名:");
                    for c in &metrics.top_categories {
                        println!("  {} ({})", c.category, c.count);
                    }
                }
                if !metrics.top_templates.is_empty() {
                    println!("\n模板排名:");
                    for t in &metrics.top_templates {
                        let name = t.name.as_deref().unwrap_or(&t.template_id);
                        println!("  {} ({})", name, t.count);
                    }
                }
            }
        }
        Commands::Push { action } => match action {
            PushAction::Enable => {
                if service.enable_push()? {
                    println!("推送已启用");
                } else {
                    println!("推送启用失败（平台不支持、权限被拒绝或订阅失败）");
                }
            }
            PushAction::Disable => {
                service.disable_push()?;
                println!("推送已停用");
            }
            PushAction::Status => {
                println!("订阅状态: {:?}", service.push_state());
                println!("偏好开关: {}", if service.is_push_enabled() { "开" } else { "关" });
            }
        },
    }

    service.dispose()?;
    Ok(())
}
