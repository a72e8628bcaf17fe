//! Time schedule pages shared by the extraction and orchestration tests.

pub(crate) const ROOT_URL: &str = "https://example.edu/timeschd/";

/// Builds a root index from `(href, title, abbreviation)` entries.
pub(crate) fn index(entries: &[(&str, &str, &str)]) -> String {
    let items: String = entries
        .iter()
        .map(|(href, title, abbr)| format!("<li><a href=\"{href}\">{title} ({abbr})</a></li>\n"))
        .collect();
    format!(
        "<html><body><h1>Time Schedule</h1>\n<a href=\"help.html\">Help</a>\n<ul>\n{items}</ul></body></html>"
    )
}

/// Builds a department page from `(code, title, slns)` entries, with the
/// section numbers separated by spaces.
pub(crate) fn dept_page(abbr: &str, classes: &[(&str, &str, &str)]) -> String {
    let mut body = String::new();
    for (code, title, slns) in classes {
        let anchor = format!("{}{}", abbr.to_lowercase().replace(' ', ""), code);
        body.push_str(&format!(
            "<table bgcolor=\"#ccffcc\" width=\"100%\"><tr>\
             <td width=\"50%\"><b><a name=\"{anchor}\">{abbr} {code}</a> \
             <a href=\"/students/crscat/{anchor}.html\">{title}</a></b></td>\
             <td width=\"15%\">(NW)</td></tr></table>\n"
        ));
        for sln in slns.split_whitespace() {
            body.push_str(&format!(
                "<table width=\"100%\"><tr><td><pre>\n\
                 {sln} A  5       MWF    0930-1020  SAV  260      Staff,Teaching            Open     10/  40\n\
                 </pre></td></tr></table>\n"
            ));
        }
    }
    format!("<html><body><h1>{abbr}</h1>\n{body}</body></html>")
}

/// A Computer Science page with two classes and three sections.
pub(crate) fn cse_page() -> String {
    r##"<html><body>
<h1>Computer Science &amp; Engineering</h1>
<table bgcolor="#ccffcc" width="100%"><tr>
<td width="50%"><b><a name="cse142">CSE   142 </a>&nbsp;<a href="/students/crscat/cse.html#cse142">COMPUTER PRGRMNG I</a></b></td>
<td width="15%"><b><a href="/students/crscat/cse.html">Prerequisites</a></b> (QSR)</td>
</tr></table>
<table width="100%"><tr><td><pre>
<a href="https://example.edu/sln.asp?sln=12345">12345</a> A  4       MWF    1130-1220  KNE  130      Reges,Stuart              Open    420/ 500
</pre></td></tr></table>
<table width="100%"><tr><td><pre>
Restr <a href="https://example.edu/sln.asp?sln=12346">12346</a> AA QZ      T      0930-1020  MGH  241                                Open     18/  25  CR/NC  $25  W
                        Th     1030-1120  MGH  231
                        Open only to entering freshmen.
</pre></td></tr></table>
<table bgcolor="#ccffcc" width="100%"><tr>
<td width="50%"><b><a name="cse143">CSE   143 </a>&nbsp;<a href="/students/crscat/cse.html#cse143">COMPUTER PRGRMNG II</a></b></td>
<td width="15%">(QSR)</td>
</tr></table>
<table width="100%"><tr><td><pre>
<a href="https://example.edu/sln.asp?sln=12400">12400</a> A  5       TTh    0130-0320P SMI  120      Ernst,Michael             Closed  300/ 300
</pre></td></tr></table>
</body></html>
"##
    .to_string()
}
