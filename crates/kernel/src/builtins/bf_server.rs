// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The task, connection and server-administration builtins.

use crate::builtins::BfRet::{Ret, VmInstr};
use crate::builtins::{world_state_bf_err, BfCallState, BfErr, BfRet, BuiltinFunction};
use crate::vm::ExecutionResult;
use chrono::TimeZone;
use etamoo_common::model::WorldState;
use etamoo_compiler::offset_for_builtin;
use etamoo_var::ErrorCode::{E_INVARG, E_PERM, E_TYPE};
use etamoo_var::{v_int, v_list, v_none, v_obj, v_str, v_string, Obj, Var, Variant};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, info, warn};

fn obj_arg(v: &Var) -> Result<Obj, BfErr> {
    v.as_obj().ok_or(BfErr::Code(E_TYPE))
}

fn check_wizard(bf_args: &BfCallState<'_>) -> Result<(), BfErr> {
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() {
        return Err(BfErr::Code(E_PERM));
    }
    Ok(())
}

// Task builtins.

fn bf_task_id(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_int(bf_args.exec_state.task_id as i64)))
}

/// suspend([seconds]): commit, sleep, resume with the value passed to
/// `resume()` (0 for a plain timed wake).
fn bf_suspend(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let delay = match bf_args.args.first() {
        Some(v) => {
            let seconds = match v.variant() {
                Variant::Int(i) => *i as f64,
                Variant::Float(f) => *f,
                _ => return Err(BfErr::Code(E_TYPE)),
            };
            if seconds < 0.0 {
                return Err(BfErr::Code(E_INVARG));
            }
            Some(Duration::from_secs_f64(seconds))
        }
        None => None,
    };
    Ok(VmInstr(ExecutionResult::Suspend(delay)))
}

/// read([player]): commit and wait for a line of input on the task's
/// connection.
fn bf_read(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    if let Some(requested) = bf_args.args.first() {
        let requested = obj_arg(requested)?;
        let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
        if requested != bf_args.exec_state.top().player && !perms.is_wizard() {
            return Err(BfErr::Code(E_PERM));
        }
    }
    Ok(VmInstr(ExecutionResult::NeedInput))
}

fn bf_seconds_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let left = bf_args
        .exec_state
        .time_left()
        .map(|d| d.as_secs() as i64)
        .unwrap_or(-1);
    Ok(Ret(v_int(left)))
}

fn bf_ticks_left(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let left = bf_args
        .exec_state
        .tick_slice
        .saturating_sub(bf_args.exec_state.tick_count);
    Ok(Ret(v_int(left as i64)))
}

fn bf_caller_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_obj(bf_args.caller_perms())))
}

/// set_task_perms(who): wizards can act as anyone; everyone else only as
/// themselves.
fn bf_set_task_perms(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let who = obj_arg(&bf_args.args[0])?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && who != perms.who {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.exec_state.set_task_perms(who);
    Ok(Ret(v_none()))
}

fn bf_callers(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_list(&bf_args.exec_state.callers())))
}

fn bf_queued_tasks(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let tasks = bf_args.task_scheduler_client.request_queued_tasks();
    let rows: Vec<Var> = tasks
        .iter()
        .map(|t| {
            let start_time = t
                .start_time
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(-1);
            v_list(&[
                v_int(t.task_id as i64),
                v_int(start_time),
                // Legacy clock-ticks and clock-id slots.
                v_int(0),
                v_int(0),
                v_obj(t.permissions),
                v_obj(t.verb_definer),
                v_string(t.verb_name.clone()),
                v_int(t.line_number as i64),
                v_obj(t.this),
            ])
        })
        .collect();
    Ok(Ret(v_list(&rows)))
}

/// queue_info() lists players with queued tasks; queue_info(player) counts
/// that player's.
fn bf_queue_info(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let tasks = bf_args.task_scheduler_client.request_queued_tasks();
    match bf_args.args.first() {
        None => {
            let mut players: Vec<Obj> = tasks.iter().map(|t| t.permissions).collect();
            players.sort();
            players.dedup();
            let players: Vec<Var> = players.iter().map(|p| v_obj(*p)).collect();
            Ok(Ret(v_list(&players)))
        }
        Some(player) => {
            let player = obj_arg(player)?;
            let count = tasks.iter().filter(|t| t.permissions == player).count();
            Ok(Ret(v_int(count as i64)))
        }
    }
}

fn bf_kill_task(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let victim = bf_args.args[0].as_int().ok_or(BfErr::Code(E_TYPE))?;
    if victim < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    // Killing yourself is an immediate abort, not a round trip.
    if victim as usize == bf_args.exec_state.task_id {
        return Ok(VmInstr(ExecutionResult::Exception(
            crate::vm::FinallyReason::Abort,
        )));
    }
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let result = bf_args
        .task_scheduler_client
        .kill_task(victim as usize, perms);
    if let Variant::Err(e) = result.variant() {
        return Err(BfErr::Raise(e.clone()));
    }
    Ok(Ret(result))
}

fn bf_resume(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let victim = bf_args.args[0].as_int().ok_or(BfErr::Code(E_TYPE))?;
    if victim < 0 {
        return Err(BfErr::Code(E_INVARG));
    }
    let value = bf_args.args.get(1).cloned().unwrap_or_else(v_none);
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    let result = bf_args
        .task_scheduler_client
        .resume_task(victim as usize, value, perms);
    if let Variant::Err(e) = result.variant() {
        return Err(BfErr::Raise(e.clone()));
    }
    Ok(Ret(result))
}

// Connection builtins.

/// notify(player, message [, no-flush]): buffered output to the player's
/// connection, delivered when the task commits.
fn bf_notify(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = obj_arg(&bf_args.args[0])?;
    let Variant::Str(msg) = bf_args.args[1].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && player != perms.who {
        return Err(BfErr::Code(E_PERM));
    }
    if bf_args.session.send_text(player, msg.as_str()).is_err() {
        // An unconnected player just swallows output, like the original.
        return Ok(Ret(v_int(0)));
    }
    Ok(Ret(v_int(1)))
}

fn bf_connected_players(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let players = bf_args
        .session
        .connected_players()
        .unwrap_or_default()
        .iter()
        .map(|p| v_obj(*p))
        .collect::<Vec<_>>();
    Ok(Ret(v_list(&players)))
}

fn bf_connected_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = obj_arg(&bf_args.args[0])?;
    match bf_args.session.connected_seconds(player) {
        Ok(secs) => Ok(Ret(v_int(secs as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_idle_seconds(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = obj_arg(&bf_args.args[0])?;
    match bf_args.session.idle_seconds(player) {
        Ok(secs) => Ok(Ret(v_int(secs as i64))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_connection_name(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = obj_arg(&bf_args.args[0])?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && player != perms.who {
        return Err(BfErr::Code(E_PERM));
    }
    match bf_args.session.connection_name(player) {
        Ok(name) => Ok(Ret(v_string(name))),
        Err(_) => Err(BfErr::Code(E_INVARG)),
    }
}

fn bf_boot_player(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let player = obj_arg(&bf_args.args[0])?;
    let perms = bf_args.task_perms().map_err(world_state_bf_err)?;
    if !perms.is_wizard() && player != perms.who {
        return Err(BfErr::Code(E_PERM));
    }
    bf_args.task_scheduler_client.boot_player(player);
    Ok(Ret(v_none()))
}

/// Per-connection options are host concerns; this core carries none, so
/// every option name is invalid, matching a server with no host options.
fn bf_connection_option(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let _player = obj_arg(&bf_args.args[0])?;
    Err(BfErr::Raise(
        E_INVARG.msg("no connection options supported on this host"),
    ))
}

fn bf_set_connection_option(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let _player = obj_arg(&bf_args.args[0])?;
    Err(BfErr::Raise(
        E_INVARG.msg("no connection options supported on this host"),
    ))
}

/// Listener management belongs to the network host, an external
/// collaborator; without one, listen points cannot be changed from in-world.
fn bf_listen(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    Err(BfErr::Raise(
        etamoo_var::ErrorCode::E_QUOTA.msg("no dynamic listeners on this host"),
    ))
}

fn bf_unlisten(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    Err(BfErr::Code(E_INVARG))
}

fn bf_listeners(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_list(&[])))
}

/// Outbound connections are disabled, which the original server reports as
/// E_PERM.
fn bf_open_network_connection(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    Err(BfErr::Code(E_PERM))
}

// Server administration builtins.

fn bf_time(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(Ret(v_int(now)))
}

/// ctime([time]): the time formatted in the style of the original server,
/// local zone per TZ.
fn bf_ctime(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let time = match bf_args.args.first() {
        Some(t) => t.as_int().ok_or(BfErr::Code(E_TYPE))?,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    };
    let Some(datetime) = chrono::Local.timestamp_opt(time, 0).single() else {
        return Err(BfErr::Code(E_INVARG));
    };
    Ok(Ret(v_string(
        datetime.format("%a %b %e %H:%M:%S %Y").to_string(),
    )))
}

fn bf_dump_database(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    bf_args.task_scheduler_client.checkpoint();
    Ok(Ret(v_int(1)))
}

fn bf_shutdown(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    let message = match bf_args.args.first() {
        Some(msg) => match msg.variant() {
            Variant::Str(s) => Some(s.as_str().to_string()),
            _ => return Err(BfErr::Code(E_TYPE)),
        },
        None => None,
    };
    bf_args.task_scheduler_client.shutdown(message);
    Ok(Ret(v_none()))
}

fn bf_load_server_options(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    bf_args.task_scheduler_client.refresh_server_options();
    Ok(Ret(v_none()))
}

fn bf_server_log(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    let Variant::Str(msg) = bf_args.args[0].variant() else {
        return Err(BfErr::Code(E_TYPE));
    };
    let is_error = bf_args.args.get(1).map(|v| v.is_true()).unwrap_or(false);
    if is_error {
        error!("server_log: {}", msg.as_str());
    } else {
        info!("server_log: {}", msg.as_str());
    }
    Ok(Ret(v_none()))
}

fn bf_server_version(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_str(env!("CARGO_PKG_VERSION"))))
}

/// Allocation-size histograms are an artifact of the original's allocator;
/// there's nothing equivalent to report.
fn bf_memory_usage(_bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    Ok(Ret(v_list(&[])))
}

fn bf_db_disk_size(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    let usage = bf_args.world_state.db_usage().map_err(world_state_bf_err)?;
    Ok(Ret(v_int(usage as i64)))
}

/// There is no verb cache; report the shape of an empty one.
fn bf_verb_cache_stats(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    Ok(Ret(v_list(&[
        v_int(0),
        v_int(0),
        v_int(0),
        v_int(0),
        v_list(&[]),
    ])))
}

fn bf_log_cache_stats(bf_args: &mut BfCallState<'_>) -> Result<BfRet, BfErr> {
    check_wizard(bf_args)?;
    warn!("log_cache_stats: no verb cache in this server");
    Ok(Ret(v_none()))
}

pub(crate) fn register_bf_server(builtins: &mut [BuiltinFunction]) {
    builtins[offset_for_builtin("task_id")] = bf_task_id;
    builtins[offset_for_builtin("suspend")] = bf_suspend;
    builtins[offset_for_builtin("read")] = bf_read;
    builtins[offset_for_builtin("seconds_left")] = bf_seconds_left;
    builtins[offset_for_builtin("ticks_left")] = bf_ticks_left;
    builtins[offset_for_builtin("caller_perms")] = bf_caller_perms;
    builtins[offset_for_builtin("set_task_perms")] = bf_set_task_perms;
    builtins[offset_for_builtin("callers")] = bf_callers;
    builtins[offset_for_builtin("queued_tasks")] = bf_queued_tasks;
    builtins[offset_for_builtin("queue_info")] = bf_queue_info;
    builtins[offset_for_builtin("kill_task")] = bf_kill_task;
    builtins[offset_for_builtin("resume")] = bf_resume;
    builtins[offset_for_builtin("notify")] = bf_notify;
    builtins[offset_for_builtin("connected_players")] = bf_connected_players;
    builtins[offset_for_builtin("connected_seconds")] = bf_connected_seconds;
    builtins[offset_for_builtin("idle_seconds")] = bf_idle_seconds;
    builtins[offset_for_builtin("connection_name")] = bf_connection_name;
    builtins[offset_for_builtin("boot_player")] = bf_boot_player;
    builtins[offset_for_builtin("connection_option")] = bf_connection_option;
    builtins[offset_for_builtin("set_connection_option")] = bf_set_connection_option;
    builtins[offset_for_builtin("listen")] = bf_listen;
    builtins[offset_for_builtin("unlisten")] = bf_unlisten;
    builtins[offset_for_builtin("listeners")] = bf_listeners;
    builtins[offset_for_builtin("open_network_connection")] = bf_open_network_connection;
    builtins[offset_for_builtin("time")] = bf_time;
    builtins[offset_for_builtin("ctime")] = bf_ctime;
    builtins[offset_for_builtin("dump_database")] = bf_dump_database;
    builtins[offset_for_builtin("shutdown")] = bf_shutdown;
    builtins[offset_for_builtin("load_server_options")] = bf_load_server_options;
    builtins[offset_for_builtin("server_log")] = bf_server_log;
    builtins[offset_for_builtin("server_version")] = bf_server_version;
    builtins[offset_for_builtin("memory_usage")] = bf_memory_usage;
    builtins[offset_for_builtin("db_disk_size")] = bf_db_disk_size;
    builtins[offset_for_builtin("verb_cache_stats")] = bf_verb_cache_stats;
    builtins[offset_for_builtin("log_cache_stats")] = bf_log_cache_stats;
}
