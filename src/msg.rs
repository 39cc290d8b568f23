use std::path::PathBuf;

/// One lifecycle request, parsed from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    // -- Install
    Install(Vec<String>),
    InstallAll,
    InstallFile(Option<PathBuf>),

    // -- Uninstall
    Uninstall(Vec<String>),
    UninstallAll,

    // -- Update
    Update,

    // -- Status
    Search(Option<String>),
    List { verbose: bool },

    // -- Files
    Export { name: String, dest: PathBuf },

    // -- System
    Help,
    Unknown(String),
}

/// Parsed command line: global flags plus the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config: Option<PathBuf>,
    pub msg: Msg,
}

impl Cli {
    pub fn parse<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = None;
        let mut rest = Vec::new();
        let mut args = args.into_iter().map(Into::into);

        while let Some(arg) = args.next() {
            if let Some(path) = arg.strip_prefix("--config=") {
                config = Some(PathBuf::from(path));
            } else if arg == "--config" {
                config = args.next().map(PathBuf::from);
            } else {
                rest.push(arg);
            }
        }

        Self {
            config,
            msg: Msg::parse(&rest),
        }
    }
}

impl Msg {
    pub fn parse(args: &[String]) -> Self {
        let Some((command, rest)) = args.split_first() else {
            return Msg::Help;
        };

        match command.as_str() {
            "install" | "i" => parse_install(rest),
            "uninstall" | "un" | "remove" | "rm" => match rest {
                [single] if single.eq_ignore_ascii_case("all") => Msg::UninstallAll,
                names => Msg::Uninstall(names.to_vec()),
            },
            "update" | "updateAll" | "ua" => Msg::Update,
            "search" | "s" => {
                let query = rest.join(" ");
                Msg::Search((!query.trim().is_empty()).then_some(query))
            }
            "list" | "ls" => Msg::List {
                verbose: rest
                    .first()
                    .is_some_and(|flag| flag == "-v" || flag == "--verbose"),
            },
            "lv" => Msg::List { verbose: true },
            "upload" | "ul" | "export" => match rest {
                [name, dest, ..] => Msg::Export {
                    name: name.clone(),
                    dest: PathBuf::from(dest),
                },
                [name] => Msg::Export {
                    name: name.clone(),
                    dest: PathBuf::from("."),
                },
                [] => Msg::Unknown(command.clone()),
            },
            "help" | "-h" | "--help" => Msg::Help,
            other => Msg::Unknown(other.to_string()),
        }
    }
}

fn parse_install(rest: &[String]) -> Msg {
    match rest {
        [] => Msg::InstallFile(None),
        [flag, path, ..] if flag == "-f" || flag == "--file" => {
            Msg::InstallFile(Some(PathBuf::from(path)))
        }
        [single] if single == "all" => Msg::InstallAll,
        names => Msg::Install(names.to_vec()),
    }
}
