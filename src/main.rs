use emubridge::config;
use emubridge::worker::WorkerLauncher;
use emubridge::Result;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    let project_root = std::env::current_dir().ok();
    let settings = config::resolve(project_root.as_deref());

    match args.get(1).map(|s| s.as_str()) {
        Some("launch") => {
            WorkerLauncher::new(&settings).ensure_running()
        }
        Some("quit") => {
            WorkerLauncher::new(&settings).shutdown().await;
            Ok(())
        }
        Some("settings") => {
            println!("{:#?}", settings);
            Ok(())
        }
        _ => {
            eprintln!("Usage: emubridge <launch|quit|settings>");
            std::process::exit(1);
        }
    }
}
