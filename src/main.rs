#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    match launchr::app::run(argv).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("launchr: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
