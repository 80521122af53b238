use tracing_subscriber::EnvFilter;
use vmprobe::Flags;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Checking for virtualization...");

    let flags = Flags::default();
    let confidence = vmprobe::percentage(flags).unwrap_or(0);
    if vmprobe::detect(flags).unwrap_or(false) {
        println!(
            "Virtual machine or sandbox environment detected: {} ({confidence}% confidence)",
            vmprobe::brand()
        );
        std::process::exit(1);
    } else {
        println!("Running on physical hardware ({confidence}% confidence).");
    }
}
