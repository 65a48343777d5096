use tracing_subscriber::EnvFilter;
use workhorse::init_interrupt_handler;
use workhorse::protocol::client::ServiceClient;
use workhorse::protocol::error::WorkhorseResult;
use workhorse::protocol::worker::ReliableWorker;

const BROKER_ENDPOINT: &str = "tcp://localhost:5555";
const SERVICE: &str = "echo";

/// Echo worker: replies to every request with its own payload.
fn run_worker() -> WorkhorseResult<()> {
    let mut worker = ReliableWorker::new(BROKER_ENDPOINT.to_string(), SERVICE.to_string())?;
    loop {
        match worker.receive_next_request()? {
            None => break,
            Some(request) => worker.send_reply(request)?,
        }
    }
    Ok(())
}

fn run_client() -> WorkhorseResult<()> {
    let mut client = ServiceClient::new(BROKER_ENDPOINT.to_string())?;
    let mut count: usize = 0;
    while count < 100 {
        let reply = client.send(SERVICE, vec![b"Hello World".to_vec()])?;
        if reply.is_empty() {
            break;
        }
        count += 1;
    }
    println!("{} requests/replies processed", count);
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    init_interrupt_handler();
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} [worker|client]", args[0]);
        std::process::exit(1);
    }
    let result = match args[1].as_str() {
        "worker" => run_worker(),
        "client" => run_client(),
        _ => {
            eprintln!("Invalid argument. Use: worker or client");
            std::process::exit(1);
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    });
}
