//! # 命令
//!
//! 一行一条命令：`关键字 -参数=值 ...`。关键字与参数名不区分大小写，
//! 参数顺序任意；含空格的值用双引号括起，如`-path="/home/my disk.mia"`。
//! `#`开始的内容为注释。

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use mia_fs::layout::Fit;
use mia_fs::{
    fdisk, mkdisk, mkfs, open_volume, rmdisk, tree, FdiskRequest, FormatKind, FsError,
    MountTable, PartitionType, SizeUnit,
};
use thiserror::Error;

use crate::session::{self, Session, SessionError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("unterminated quote in {0:?}")]
    Unterminated(String),

    #[error("{command}: malformed parameter {token:?}, expected -name=value")]
    Malformed { command: &'static str, token: String },

    #[error("{command}: unknown parameter -{flag}")]
    UnknownFlag { command: &'static str, flag: String },

    #[error("{command}: parameter -{flag} given twice")]
    Duplicate { command: &'static str, flag: String },

    #[error("{command}: missing parameter -{flag}")]
    Missing { command: &'static str, flag: &'static str },

    #[error("{command}: -{flag}: {reason}")]
    Invalid {
        command: &'static str,
        flag: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("cannot read {path:?}: {source}")]
    Host { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Mkdisk {
        size: u64,
        unit: SizeUnit,
        fit: Fit,
        path: PathBuf,
    },
    Rmdisk {
        path: PathBuf,
    },
    Fdisk(FdiskRequest),
    Mount {
        path: PathBuf,
        name: String,
    },
    Mounted,
    Mkfs {
        id: String,
        kind: FormatKind,
    },
    Mkdir {
        path: String,
        parents: bool,
    },
    Mkfile {
        path: String,
        parents: bool,
        size: Option<u64>,
        cont: Option<PathBuf>,
    },
    Cat {
        file: String,
    },
    Login {
        user: String,
        pass: String,
        id: String,
    },
    Logout,
}

/// 按空白切分，引号内的空白保留，引号本身去掉
fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut token = String::new();
    let mut quoted = false;
    let mut pending = false;

    for c in line.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            '#' if !quoted && !pending => break,
            c if c.is_whitespace() && !quoted => {
                if pending {
                    tokens.push(std::mem::take(&mut token));
                    pending = false;
                }
            }
            c => {
                token.push(c);
                pending = true;
            }
        }
    }
    if quoted {
        return Err(ParseError::Unterminated(line.trim().to_owned()));
    }
    if pending {
        tokens.push(token);
    }

    Ok(tokens)
}

/// 一条命令的参数表，取出后即移除，剩余的由调用者决定是否报错
struct Flags {
    command: &'static str,
    values: HashMap<String, Option<String>>,
}

impl Flags {
    fn parse(command: &'static str, tokens: &[String], allowed: &[&str]) -> Result<Self, ParseError> {
        let mut values = HashMap::new();
        for token in tokens {
            let Some(body) = token.strip_prefix('-') else {
                return Err(ParseError::Malformed {
                    command,
                    token: token.clone(),
                });
            };
            let (flag, value) = match body.split_once('=') {
                Some((flag, value)) => (flag.to_ascii_lowercase(), Some(value.to_owned())),
                None => (body.to_ascii_lowercase(), None),
            };
            if !allowed.contains(&flag.as_str()) {
                return Err(ParseError::UnknownFlag { command, flag });
            }
            if values.insert(flag.clone(), value).is_some() {
                return Err(ParseError::Duplicate { command, flag });
            }
        }

        Ok(Self { command, values })
    }

    fn invalid(&self, flag: &'static str, reason: impl fmt::Display) -> ParseError {
        ParseError::Invalid {
            command: self.command,
            flag,
            reason: reason.to_string(),
        }
    }

    fn optional(&mut self, flag: &'static str) -> Result<Option<String>, ParseError> {
        match self.values.remove(flag) {
            None => Ok(None),
            Some(None) => Err(self.invalid(flag, "a value is required")),
            Some(Some(value)) if value.is_empty() => Err(self.invalid(flag, "empty value")),
            Some(Some(value)) => Ok(Some(value)),
        }
    }

    fn required(&mut self, flag: &'static str) -> Result<String, ParseError> {
        self.optional(flag)?.ok_or(ParseError::Missing {
            command: self.command,
            flag,
        })
    }

    fn switch(&mut self, flag: &'static str) -> Result<bool, ParseError> {
        match self.values.remove(flag) {
            None => Ok(false),
            Some(None) => Ok(true),
            Some(Some(_)) => Err(self.invalid(flag, "takes no value")),
        }
    }

    fn parsed<T>(&mut self, flag: &'static str) -> Result<Option<T>, ParseError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.optional(flag)?
            .map(|value| value.parse().map_err(|err| self.invalid(flag, err)))
            .transpose()
    }

    fn size(&mut self, flag: &'static str, allow_zero: bool) -> Result<Option<u64>, ParseError> {
        let Some(value) = self.optional(flag)? else {
            return Ok(None);
        };
        match value.parse::<u64>() {
            Ok(0) if !allow_zero => Err(self.invalid(flag, "must be positive")),
            Ok(size) => Ok(Some(size)),
            Err(_) => Err(self.invalid(flag, format!("{value:?} is not a non-negative integer"))),
        }
    }
}

impl Command {
    /// 空行与注释行返回`None`
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let tokens = tokenize(line)?;
        let Some((keyword, rest)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match keyword.to_ascii_lowercase().as_str() {
            "mkdisk" => {
                let mut flags = Flags::parse("mkdisk", rest, &["size", "unit", "fit", "path"])?;
                let size = flags.size("size", false)?;
                Self::Mkdisk {
                    size: size.ok_or(ParseError::Missing {
                        command: "mkdisk",
                        flag: "size",
                    })?,
                    unit: flags.parsed("unit")?.unwrap_or(SizeUnit::Mega),
                    fit: flags.parsed("fit")?.unwrap_or(Fit::First),
                    path: flags.required("path")?.into(),
                }
            }
            "rmdisk" => {
                let mut flags = Flags::parse("rmdisk", rest, &["path"])?;
                Self::Rmdisk {
                    path: flags.required("path")?.into(),
                }
            }
            "fdisk" => {
                let mut flags =
                    Flags::parse("fdisk", rest, &["size", "unit", "path", "type", "fit", "name"])?;
                let size = flags.size("size", false)?.ok_or(ParseError::Missing {
                    command: "fdisk",
                    flag: "size",
                })?;
                let path = flags.required("path")?;
                let name = flags.required("name")?;
                Self::Fdisk(FdiskRequest {
                    unit: flags.parsed("unit")?.unwrap_or(SizeUnit::Kilo),
                    kind: flags.parsed("type")?.unwrap_or(PartitionType::Primary),
                    fit: flags.parsed("fit")?.unwrap_or(Fit::Worst),
                    ..FdiskRequest::new(path, size, name)
                })
            }
            "mount" => {
                let mut flags = Flags::parse("mount", rest, &["path", "name"])?;
                Self::Mount {
                    path: flags.required("path")?.into(),
                    name: flags.required("name")?,
                }
            }
            "mounted" => {
                Flags::parse("mounted", rest, &[])?;
                Self::Mounted
            }
            "mkfs" => {
                let mut flags = Flags::parse("mkfs", rest, &["id", "type"])?;
                Self::Mkfs {
                    id: flags.required("id")?,
                    kind: flags.parsed("type")?.unwrap_or_default(),
                }
            }
            "mkdir" => {
                let mut flags = Flags::parse("mkdir", rest, &["path", "p"])?;
                Self::Mkdir {
                    path: flags.required("path")?,
                    parents: flags.switch("p")?,
                }
            }
            "mkfile" => {
                let mut flags = Flags::parse("mkfile", rest, &["path", "r", "size", "cont"])?;
                Self::Mkfile {
                    path: flags.required("path")?,
                    parents: flags.switch("r")?,
                    size: flags.size("size", true)?,
                    cont: flags.optional("cont")?.map(PathBuf::from),
                }
            }
            "cat" => {
                let mut flags = Flags::parse("cat", rest, &["file"])?;
                Self::Cat {
                    file: flags.required("file")?,
                }
            }
            "login" => {
                let mut flags = Flags::parse("login", rest, &["user", "pass", "id"])?;
                Self::Login {
                    user: flags.required("user")?,
                    pass: flags.required("pass")?,
                    id: flags.required("id")?,
                }
            }
            "logout" => {
                Flags::parse("logout", rest, &[])?;
                Self::Logout
            }
            _ => return Err(ParseError::UnknownCommand(keyword.clone())),
        };

        Ok(Some(command))
    }
}

/// 贯穿整个进程的状态：挂载表与当前会话
pub struct Context {
    pub table: MountTable,
    pub session: Option<Session>,
}

impl Context {
    pub fn new(table: MountTable) -> Self {
        Self {
            table,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session, SessionError> {
        self.session.as_ref().ok_or(SessionError::NotLoggedIn)
    }
}

/// 执行一条命令，返回给用户看的结果
pub fn execute(ctx: &mut Context, command: Command) -> Result<String, CommandError> {
    let message = match command {
        Command::Mkdisk {
            size,
            unit,
            fit,
            path,
        } => {
            let image = mkdisk(&path, size, unit, fit)?;
            format!("disk {path:?} created ({} bytes)", image.len().map_err(FsError::from)?)
        }
        Command::Rmdisk { path } => {
            rmdisk(&path)?;
            format!("disk {path:?} removed")
        }
        Command::Fdisk(req) => {
            let placement = fdisk(&req)?;
            format!(
                "{:?} partition {:?} created at byte {} ({} bytes)",
                placement.kind, req.name, placement.start, placement.size
            )
        }
        Command::Mount { path, name } => {
            let id = ctx.table.mount(&path, &name)?;
            format!("partition {name:?} of {path:?} mounted as {id}")
        }
        Command::Mounted => mounted(&ctx.table),
        Command::Mkfs { id, kind } => {
            let sb = mkfs(&ctx.table, &id, kind)?;
            format!(
                "partition {id} formatted: {} inodes, {} blocks",
                sb.inodes_count, sb.blocks_count
            )
        }
        Command::Mkdir { path, parents } => {
            let mut vol = open_volume(&ctx.table, &ctx.session()?.id)?;
            tree::mkdir(&mut vol, &path, parents)?;
            format!("directory {path:?} created")
        }
        Command::Mkfile {
            path,
            parents,
            size,
            cont,
        } => {
            let id = &ctx.session()?.id;
            let content = match (cont, size) {
                (Some(host), _) => read_host(&host)?,
                (None, Some(size)) => {
                    tree::check_file_len(size)?;
                    tree::digits(size as usize)
                }
                (None, None) => Vec::new(),
            };
            let mut vol = open_volume(&ctx.table, id)?;
            tree::mkfile(&mut vol, &path, parents, &content)?;
            format!("file {path:?} created ({} bytes)", content.len())
        }
        Command::Cat { file } => {
            let vol = open_volume(&ctx.table, &ctx.session()?.id)?;
            String::from_utf8_lossy(&tree::cat(&vol, &file)?).into_owned()
        }
        Command::Login { user, pass, id } => {
            let session = session::login(&ctx.table, &ctx.session, &user, &pass, &id)?;
            ctx.session = Some(session);
            format!("welcome {user}, working on {id}")
        }
        Command::Logout => {
            let session = ctx.session.take().ok_or(SessionError::NotLoggedIn)?;
            log::info!("{:?} logged out", session.user.name);
            format!("goodbye {}", session.user.name)
        }
    };

    Ok(message)
}

/// 先看文件长度，过大的文件不读入内存
fn read_host(host: &Path) -> Result<Vec<u8>, CommandError> {
    let io_err = |source| CommandError::Host {
        path: host.to_owned(),
        source,
    };
    let len = fs::metadata(host).map_err(io_err)?.len();
    tree::check_file_len(len)?;
    fs::read(host).map_err(io_err)
}

fn mounted(table: &MountTable) -> String {
    if table.entries().is_empty() {
        return "no mounted partitions".to_owned();
    }

    table
        .mounted()
        .map(|(entry, partition)| {
            let path = entry.path.display();
            match partition {
                Ok(p) => format!("{}\tpath={path}\tname={}", entry.id, p.name),
                Err(err) => format!("{}\tpath={path}\terror: {err}", entry.id),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens() {
        assert_eq!(
            vec!["mkdisk", "-size=3000", "-path=/home/my disk.mia"],
            tokenize(r#"mkdisk -size=3000 -path="/home/my disk.mia""#).unwrap()
        );
        assert_eq!(vec!["mounted"], tokenize("  mounted   # list").unwrap());
        assert!(tokenize("# whole line").unwrap().is_empty());
        assert_eq!(vec!["-name=a#b"], tokenize("-name=a#b").unwrap());
        assert!(matches!(
            tokenize(r#"mount -path="/x"#),
            Err(ParseError::Unterminated(_))
        ));
    }

    #[test]
    fn keywords_and_flags_ignore_case() {
        let cmd = Command::parse(r#"FDISK -Size=300 -PATH="/home/disco.mia" -name=Part1 -Unit=b -fit=bf"#)
            .unwrap()
            .unwrap();
        let Command::Fdisk(req) = cmd else {
            panic!("not fdisk: {cmd:?}");
        };
        assert_eq!(300, req.size);
        assert_eq!(SizeUnit::Byte, req.unit);
        assert_eq!(Fit::Best, req.fit);
        assert_eq!(PartitionType::Primary, req.kind);
        assert_eq!("Part1", req.name);
    }

    #[test]
    fn defaults() {
        assert_eq!(
            Some(Command::Mkdisk {
                size: 5,
                unit: SizeUnit::Mega,
                fit: Fit::First,
                path: "/tmp/a.mia".into(),
            }),
            Command::parse("mkdisk -path=/tmp/a.mia -size=5").unwrap()
        );
        assert_eq!(
            Some(Command::Mkfs {
                id: "341A".to_owned(),
                kind: FormatKind::Fast,
            }),
            Command::parse("mkfs -id=341A").unwrap()
        );
        assert_eq!(
            Some(Command::Mkdir {
                path: "/home/user".to_owned(),
                parents: true,
            }),
            Command::parse("mkdir -p -path=/home/user").unwrap()
        );
        assert_eq!(None, Command::parse("   ").unwrap());
    }

    #[test]
    fn parse_errors() {
        let err = |line| Command::parse(line).unwrap_err();

        assert!(matches!(err("format -id=1"), ParseError::UnknownCommand(_)));
        assert!(matches!(
            err("mkdisk -size=10"),
            ParseError::Missing { flag: "path", .. }
        ));
        assert!(matches!(
            err("mkdisk -size=0 -path=/a.mia"),
            ParseError::Invalid { flag: "size", .. }
        ));
        assert!(matches!(
            err("mkdisk -size=-4 -path=/a.mia"),
            ParseError::Invalid { flag: "size", .. }
        ));
        assert!(matches!(
            err("mkdisk -size=4 -path=/a.mia -colour=red"),
            ParseError::UnknownFlag { .. }
        ));
        assert!(matches!(
            err("mount -path=/a.mia -name=A -name=B"),
            ParseError::Duplicate { .. }
        ));
        assert!(matches!(
            err("mount path=/a.mia -name=A"),
            ParseError::Malformed { .. }
        ));
        assert!(matches!(
            err("fdisk -size=4 -path=/a.mia -name=A -type=X"),
            ParseError::Invalid { flag: "type", .. }
        ));
        assert!(matches!(
            err("mkdir -path=/a -p=yes"),
            ParseError::Invalid { flag: "p", .. }
        ));
        assert!(matches!(err("logout now"), ParseError::Malformed { .. }));
    }

    #[test]
    fn session_commands() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disco.mia");
        let mut ctx = Context::new(MountTable::new("34"));
        let mut run = |line: &str| {
            let command = Command::parse(line).unwrap().unwrap();
            execute(&mut ctx, command)
        };

        run(&format!("mkdisk -size=1 -path={}", disk.display())).unwrap();
        run(&format!("fdisk -size=500 -path={} -name=Part1", disk.display())).unwrap();
        run(&format!("mount -path={} -name=Part1", disk.display())).unwrap();
        run("mkfs -id=341A").unwrap();

        assert!(matches!(
            run("mkdir -path=/home"),
            Err(CommandError::Session(SessionError::NotLoggedIn))
        ));
        assert!(matches!(
            run("mkfile -path=/big.txt -size=100000000000000000"),
            Err(CommandError::Session(SessionError::NotLoggedIn))
        ));
        assert!(matches!(
            run("login -user=root -pass=nope -id=341A"),
            Err(CommandError::Session(SessionError::WrongPassword(_)))
        ));
        run("login -user=root -pass=123 -id=341A").unwrap();
        assert!(matches!(
            run("login -user=root -pass=123 -id=341A"),
            Err(CommandError::Session(SessionError::AlreadyLoggedIn(_)))
        ));

        run("mkdir -p -path=/home/user/docs").unwrap();
        run("mkfile -path=/home/user/docs/a.txt -size=12").unwrap();
        assert_eq!("012345678901", run("cat -file=/home/user/docs/a.txt").unwrap());

        let host = dir.path().join("host.txt");
        fs::write(&host, "from the host").unwrap();
        run(&format!(
            "mkfile -r -path=/notes/b.txt -size=3 -cont=\"{}\"",
            host.display()
        ))
        .unwrap();
        assert_eq!("from the host", run("cat -file=/notes/b.txt").unwrap());

        assert!(matches!(
            run("mkfile -path=/big.txt -size=100000000000000000"),
            Err(CommandError::Fs(FsError::FileTooLarge { max: 1792, .. }))
        ));
        let huge = dir.path().join("huge.bin");
        fs::File::create(&huge).unwrap().set_len(1 << 30).unwrap();
        assert!(matches!(
            run(&format!("mkfile -path=/huge.bin -cont={}", huge.display())),
            Err(CommandError::Fs(FsError::FileTooLarge { .. }))
        ));
        assert!(matches!(
            run("cat -file=/big.txt"),
            Err(CommandError::Fs(FsError::NotFound(_)))
        ));

        let listing = run("mounted").unwrap();
        assert!(listing.starts_with("341A\t"));
        assert!(listing.ends_with("name=Part1"));

        run("logout").unwrap();
        assert!(run("logout").is_err());
        assert!(run("cat -file=/users.txt").is_err());
    }
}
