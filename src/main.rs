// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `server [-t threads] <port>` — binds the port, serves the current directory, and
//! runs until `SIGINT`/`SIGTERM`.

use std::process::ExitCode;

use rwserver::Server;
use rwserver::ServerConfig;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match ServerConfig::from_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let server = match Server::with_stderr_audit(config) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("failed to start server: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = server.run() {
        eprintln!("server exited with error: {err}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
