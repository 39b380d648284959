use std::{
    io::{self, BufRead, Write},
    net::SocketAddr,
};

use hoststat::{
    client::{BenchmarkClient, Transport},
    protocol::{Lookup, OPERATIONS, lookup},
};

/// Presents the menu and sends one request per choice until the user quits.
pub fn run(addr: SocketAddr) -> io::Result<()> {
    let client = BenchmarkClient::new(addr);
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    show_menu();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            return Ok(());
        };
        let input = line?;
        let input = input.trim();

        if ["quit", "stop", "exit"]
            .iter()
            .any(|word| input.eq_ignore_ascii_case(word))
        {
            return Ok(());
        }

        let operation = match lookup(input) {
            Lookup::Quit => return Ok(()),
            Lookup::Found(op) => op,
            Lookup::Ambiguous(positions) => {
                let positions: Vec<String> = positions.iter().map(usize::to_string).collect();
                println!("Did you mean {}?", or_list(&positions));
                show_menu();
                continue;
            }
            Lookup::NotFound => {
                println!("Invalid choice.");
                show_menu();
                continue;
            }
        };

        match client.do_request(operation) {
            Ok(response) => println!("{response}"),
            Err(e) => println!("Error communicating with server: {e}"),
        }
    }
}

fn show_menu() {
    println!(
        "---There are {} supported operations-------------",
        OPERATIONS.len()
    );
    for (i, op) in OPERATIONS.iter().enumerate() {
        println!(" {}. {}", i + 1, op.description);
    }
    println!("Enter 0 to quit.");
    println!();
}

/// Joins items as "a, b, or c".
fn or_list(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}
