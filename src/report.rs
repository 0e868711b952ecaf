//! Delimited text dumps of cached collections.

use std::io::Write;

use crate::{
    model::{FieldValue, Record, RecordId},
    remote::RemoteApi,
    session::Session,
};

/// Line layout of a dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportStyle {
    pub separator: String,
    pub prefix: String,
    pub suffix: String,
}

impl Default for ReportStyle {
    fn default() -> Self {
        ReportStyle {
            separator: ", ".to_owned(),
            prefix: String::new(),
            suffix: "\n".to_owned(),
        }
    }
}

impl ReportStyle {
    fn write_line<W, I, S>(&self, out: &mut W, cells: I) -> std::io::Result<()>
    where
        W: Write + ?Sized,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        out.write_all(self.prefix.as_bytes())?;
        for (index, cell) in cells.into_iter().enumerate() {
            if index > 0 {
                out.write_all(self.separator.as_bytes())?;
            }
            out.write_all(cell.as_ref().as_bytes())?;
        }
        out.write_all(self.suffix.as_bytes())
    }
}

struct Column {
    header: &'static str,
    field: &'static str,
}

const fn column(header: &'static str, field: &'static str) -> Column {
    Column { header, field }
}

const USER_COLUMNS: &[Column] = &[
    column("ID", "id"),
    column("User Name", "username"),
    column("Full Name", "name"),
    column("Email", "email"),
];

const GROUP_COLUMNS: &[Column] = &[
    column("ID", "id"),
    column("Group Name", "path"),
    column("Description", "description"),
];

const NAMESPACE_COLUMNS: &[Column] = &[
    column("ID", "id"),
    column("Kind", "kind"),
    column("Namespace", "path"),
];

const REPOSITORY_COLUMNS: &[Column] = &[
    column("ID", "id"),
    column("Repository Path", "path_with_namespace"),
    column("Description", "description"),
    column("Public", "public"),
];

fn cell(record: &Record, field: &str) -> String {
    record.get(field).map(FieldValue::to_string).unwrap_or_default()
}

fn contains(record: &Record, fields: &[&str], search: &str) -> bool {
    search.is_empty()
        || fields
            .iter()
            .filter_map(|field| record.get_str(field))
            .any(|value| value.contains(search))
}

fn write_table<'a, W>(
    style: &ReportStyle,
    out: &mut W,
    columns: &[Column],
    records: impl Iterator<Item = &'a Record>,
) -> std::io::Result<()>
where
    W: Write + ?Sized,
{
    style.write_line(out, columns.iter().map(|column| column.header))?;
    for record in records {
        style.write_line(out, columns.iter().map(|column| cell(record, column.field)))?;
    }
    Ok(())
}

/// Writes users whose username or email contains `search`.
pub fn users<R, W>(
    session: &mut Session<R>,
    search: &str,
    use_cache: bool,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: RemoteApi,
    W: Write + ?Sized,
{
    let style = session.config().report.clone();
    let records = session.users(use_cache)?;
    write_table(
        &style,
        out,
        USER_COLUMNS,
        records
            .iter()
            .filter(|user| contains(user, &["username", "email"], search)),
    )?;
    Ok(())
}

/// Writes groups whose path contains `search`.
pub fn groups<R, W>(
    session: &mut Session<R>,
    search: &str,
    use_cache: bool,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: RemoteApi,
    W: Write + ?Sized,
{
    let style = session.config().report.clone();
    let records = session.groups(use_cache)?;
    write_table(
        &style,
        out,
        GROUP_COLUMNS,
        records
            .iter()
            .filter(|group| contains(group, &["path"], search)),
    )?;
    Ok(())
}

/// Writes namespaces whose path contains `search`.
pub fn namespaces<R, W>(
    session: &mut Session<R>,
    search: &str,
    use_cache: bool,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: RemoteApi,
    W: Write + ?Sized,
{
    let style = session.config().report.clone();
    let records = session.namespaces(use_cache)?;
    write_table(
        &style,
        out,
        NAMESPACE_COLUMNS,
        records
            .iter()
            .filter(|namespace| contains(namespace, &["path"], search)),
    )?;
    Ok(())
}

/// Writes repositories whose path contains `search`, with the username of the
/// owner of their namespace as last column.
pub fn repos<R, W>(
    session: &mut Session<R>,
    search: &str,
    use_cache: bool,
    out: &mut W,
) -> anyhow::Result<()>
where
    R: RemoteApi,
    W: Write + ?Sized,
{
    let style = session.config().report.clone();
    // Owners are resolved through the user index, which must be populated first.
    session.users(true)?;
    session.repos(use_cache)?;

    let headers = REPOSITORY_COLUMNS
        .iter()
        .map(|column| column.header)
        .chain(["Owner"]);
    style.write_line(out, headers)?;

    for repo in session
        .repo_cache()
        .export()
        .iter()
        .filter(|repo| contains(repo, &["path_with_namespace"], search))
    {
        let owner = repo
            .get("namespace")
            .and_then(|namespace| namespace.get("owner_id"))
            .and_then(FieldValue::as_int)
            .and_then(|id| session.user_by_id(&RecordId::Int(id)))
            .and_then(|user| user.get_str("username"))
            .unwrap_or_default()
            .to_owned();
        let cells = REPOSITORY_COLUMNS
            .iter()
            .map(|column| cell(repo, column.field))
            .chain([owner]);
        style.write_line(out, cells)?;
    }
    Ok(())
}
