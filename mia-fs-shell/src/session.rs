//! 登录会话
//!
//! 用户表`/users.txt`每行一条记录：
//! - 组：`gid,G,组名`
//! - 用户：`uid,U,组名,用户名,密码`
//!
//! 编号为`0`的记录视为已删除。

use mia_fs::{open_volume, tree, FsError, MountTable, USERS_FILE};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0:?} is already logged in, log out first")]
    AlreadyLoggedIn(String),

    #[error("no user is logged in")]
    NotLoggedIn,

    #[error("user {0:?} does not exist")]
    UnknownUser(String),

    #[error("wrong password for {0:?}")]
    WrongPassword(String),

    #[error(transparent)]
    Fs(#[from] FsError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub uid: u32,
    pub group: String,
    pub name: String,
    password: String,
}

/// 已登录的用户及其所在分区
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub id: String,
}

/// 解析用户表中的用户记录，忽略组记录、已删除与格式错误的行
pub fn parse_users(text: &str) -> Vec<User> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                [uid, kind, group, name, password] if kind.eq_ignore_ascii_case("U") => {
                    let Ok(uid) = uid.parse::<u32>() else {
                        log::warn!("skipping user record with bad uid: {line:?}");
                        return None;
                    };
                    (uid != 0).then(|| User {
                        uid,
                        group: group.to_string(),
                        name: name.to_string(),
                        password: password.to_string(),
                    })
                }
                [_, kind, _] if kind.eq_ignore_ascii_case("G") => None,
                _ => {
                    log::warn!("skipping malformed record: {line:?}");
                    None
                }
            }
        })
        .collect()
}

/// 在已挂载分区`id`上验证用户
pub fn login(
    table: &MountTable,
    current: &Option<Session>,
    user: &str,
    pass: &str,
    id: &str,
) -> Result<Session, SessionError> {
    if let Some(session) = current {
        return Err(SessionError::AlreadyLoggedIn(session.user.name.clone()));
    }

    let vol = open_volume(table, id)?;
    let content = tree::cat(&vol, &format!("/{USERS_FILE}"))?;
    let users = parse_users(&String::from_utf8_lossy(&content));

    let found = users
        .into_iter()
        .find(|u| u.name == user)
        .ok_or_else(|| SessionError::UnknownUser(user.to_owned()))?;
    if found.password != pass {
        return Err(SessionError::WrongPassword(user.to_owned()));
    }
    log::info!("{user:?} logged in on {id}");

    Ok(Session {
        user: found,
        id: id.to_owned(),
    })
}
