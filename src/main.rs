use anyhow::Result;
use batch_orchestrator::utils::logging;
use batch_orchestrator::{App, Config, JobStatus};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let job = App::initialize(config)?.run().await?;

    if job.status == JobStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}
