//! Operator commands read from stdin.

use yate_proto::BlockPos;

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Status,
    /// Blocking lookup of one voxel.
    Voxel(BlockPos),
    /// Ask the proxy to resend one voxel.
    Refresh(BlockPos),
    /// Ask the proxy for everything since the last update.
    Visual,
    Connect,
    Disconnect,
    Quit,
    Help,
}

pub const HELP: &str = "commands: status | voxel <x> <y> <z> | refresh <x> <y> <z> | visual | connect | disconnect | quit";

pub fn parse(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Err("empty command".into());
    };
    let args: Vec<&str> = words.collect();
    let cmd = match name.to_lowercase().as_str() {
        "status" => Command::Status,
        "voxel" | "get" => Command::Voxel(parse_pos(&args)?),
        "refresh" => Command::Refresh(parse_pos(&args)?),
        "visual" => Command::Visual,
        "connect" => Command::Connect,
        "disconnect" => Command::Disconnect,
        "quit" | "exit" | "stop" => Command::Quit,
        "help" | "?" => Command::Help,
        other => return Err(format!("unknown command '{other}'")),
    };
    Ok(cmd)
}

fn parse_pos(args: &[&str]) -> Result<BlockPos, String> {
    let [x, y, z] = args else {
        return Err(format!("expected <x> <y> <z>, got {} argument(s)", args.len()));
    };
    let coord = |s: &str| {
        s.parse::<i32>()
            .map_err(|_| format!("'{s}' is not an integer coordinate"))
    };
    Ok(BlockPos::new(coord(x)?, coord(y)?, coord(z)?))
}
