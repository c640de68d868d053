use std::{
    env, fs,
    io::{self, Write},
    process,
};

fn required(value: Option<String>, flag: &str) -> String {
    value.unwrap_or_else(|| {
        eprintln!("missing value for {flag}");
        process::exit(2);
    })
}

fn main() {
    let mut exit_code = 0;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout-line" => {
                let line = required(args.next(), "--stdout-line");
                writeln!(io::stdout().lock(), "{line}").unwrap();
            }
            "--stderr-line" => {
                let line = required(args.next(), "--stderr-line");
                writeln!(io::stderr().lock(), "{line}").unwrap();
            }
            "--stdout-lines" => {
                let count = required(args.next(), "--stdout-lines");
                let count: usize = count.parse().unwrap_or_else(|_| {
                    eprintln!("invalid line count: {count}");
                    process::exit(2);
                });
                let mut stdout = io::stdout().lock();
                for i in 0..count {
                    writeln!(stdout, "line {i}").unwrap();
                }
            }
            "--stdout-invalid-utf8" => {
                io::stdout().lock().write_all(b"\xff\xfe\xfd\n").unwrap();
            }
            "--print-env" => {
                let key = required(args.next(), "--print-env");
                let value = env::var(&key).unwrap_or_default();
                writeln!(io::stdout().lock(), "{key}={value}").unwrap();
            }
            "--write-crash-log" => {
                let name = format!("hs_err_pid{}.log", process::id());
                fs::write(name, "# A fatal error has been detected\n").unwrap();
            }
            "--exit" => {
                let code = required(args.next(), "--exit");
                exit_code = code.parse().unwrap_or_else(|_| {
                    eprintln!("invalid exit code: {code}");
                    process::exit(2);
                });
            }
            other => {
                eprintln!("unknown argument: {other}");
                process::exit(2);
            }
        }
    }
    io::stdout().flush().unwrap();
    process::exit(exit_code);
}
