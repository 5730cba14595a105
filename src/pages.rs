//! HTML pages served by the portal.
//!
//! Every page has a built-in template that can be replaced by a file of the
//! same name in the page override directory. Templates may use the
//! placeholders `{host}`, `{apip}`, `{ssid_options}`, `{errors}` and
//! `{result}`.

use crate::services::settings::ValidationErrors;
use anyhow::{Context, Result, ensure};
use log::info;
use std::{collections::HashMap, fs, net::Ipv4Addr, path::Path};

/// What the portal answers to a request
#[derive(Clone, Debug, PartialEq)]
pub enum View {
    Greeting,
    WebForm { ssids: Vec<String> },
    ValidationFailed(ValidationErrors),
    TestInProgress,
    StillTesting,
    NotStarted,
    NotValidated,
    Result(ResultSummary),
    GaveUp,
    Closed,
    Redirect(&'static str),
}

/// Connectivity outcome as shown to the user
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSummary {
    pub ssid: String,
    pub obtained_ip: Option<Ipv4Addr>,
    pub internet_check_requested: bool,
    pub internet_reachable: Option<bool>,
    /// Offer restart and cancel links
    pub offer_restart: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Page {
    Greeting,
    WebForm,
    TestInProgress,
    Wait,
    NotStarted,
    NotValidated,
    GiveUp,
    Errors,
    Result,
    Closed,
}

impl Page {
    pub const ALL: [Page; 10] = [
        Page::Greeting,
        Page::WebForm,
        Page::TestInProgress,
        Page::Wait,
        Page::NotStarted,
        Page::NotValidated,
        Page::GiveUp,
        Page::Errors,
        Page::Result,
        Page::Closed,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Page::Greeting => "greeting.html",
            Page::WebForm => "webform.html",
            Page::TestInProgress => "testinprogress.html",
            Page::Wait => "wait.html",
            Page::NotStarted => "notstarted.html",
            Page::NotValidated => "notvalidated.html",
            Page::GiveUp => "giveup.html",
            Page::Errors => "errors.html",
            Page::Result => "result.html",
            Page::Closed => "closed.html",
        }
    }

    fn builtin(self) -> &'static str {
        match self {
            Page::Greeting => GREETING,
            Page::WebForm => WEB_FORM,
            Page::TestInProgress => TEST_IN_PROGRESS,
            Page::Wait => WAIT,
            Page::NotStarted => NOT_STARTED,
            Page::NotValidated => NOT_VALIDATED,
            Page::GiveUp => GIVE_UP,
            Page::Errors => ERRORS,
            Page::Result => RESULT,
            Page::Closed => CLOSED,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Pages {
    host: String,
    apip: Ipv4Addr,
    overrides: HashMap<Page, String>,
}

impl Pages {
    pub fn new(host: &str, apip: Ipv4Addr) -> Self {
        Self {
            host: host.to_string(),
            apip,
            overrides: HashMap::new(),
        }
    }

    /// Built-in pages replaced by whatever the override directory provides
    pub fn load(host: &str, apip: Ipv4Addr, dir: Option<&Path>) -> Result<Self> {
        let mut pages = Self::new(host, apip);

        let Some(dir) = dir else {
            return Ok(pages);
        };

        ensure!(dir.is_dir(), "page directory {dir:?} does not exist");

        for page in Page::ALL {
            let path = dir.join(page.file_name());
            if path.is_file() {
                info!("use custom page {path:?}");
                let html =
                    fs::read_to_string(&path).context(format!("failed to read page {path:?}"))?;
                pages.overrides.insert(page, html);
            }
        }

        Ok(pages)
    }

    /// Absolute portal URL of `path`
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.apip)
    }

    /// HTML for a view, `None` for redirects
    pub fn render(&self, view: &View) -> Option<String> {
        let html = match view {
            View::Greeting => self.fill(Page::Greeting, &[]),
            View::WebForm { ssids } => {
                let options: String = ssids
                    .iter()
                    .map(|ssid| format!("<option value=\"{}\">\n", escape(ssid)))
                    .collect();
                self.fill(Page::WebForm, &[("{ssid_options}", options.as_str())])
            }
            View::ValidationFailed(errors) => {
                let messages: Vec<String> =
                    errors.errors().iter().map(|e| escape(&e.message)).collect();
                let errors = messages.join("<br>");
                self.fill(Page::Errors, &[("{errors}", errors.as_str())])
            }
            View::TestInProgress => self.fill(Page::TestInProgress, &[]),
            View::StillTesting => self.fill(Page::Wait, &[]),
            View::NotStarted => self.fill(Page::NotStarted, &[]),
            View::NotValidated => self.fill(Page::NotValidated, &[]),
            View::Result(summary) => {
                let result = self.result_fragment(summary);
                self.fill(Page::Result, &[("{result}", result.as_str())])
            }
            View::GaveUp => self.fill(Page::GiveUp, &[]),
            View::Closed => self.fill(Page::Closed, &[]),
            View::Redirect(_) => return None,
        };

        Some(html)
    }

    fn fill(&self, page: Page, values: &[(&str, &str)]) -> String {
        let template = self
            .overrides
            .get(&page)
            .map_or(page.builtin(), String::as_str);

        let apip = self.apip.to_string();
        let host = escape(&self.host);

        [("{host}", host.as_str()), ("{apip}", apip.as_str())]
            .iter()
            .chain(values.iter())
            .fold(template.to_string(), |html, (key, value)| {
                html.replace(key, value)
            })
    }

    fn result_fragment(&self, summary: &ResultSummary) -> String {
        let mut html = match summary.obtained_ip {
            Some(ip) => format!(
                "<h2>Obtained IP Address {ip} via WiFi SSID '{}'</h2>\n",
                escape(&summary.ssid)
            ),
            None => "<h2>WiFi Did NOT Connect Successfully</h2>\n".to_string(),
        };

        html.push_str(match (summary.internet_check_requested, summary.internet_reachable) {
            (_, Some(true)) => "<h2>Internet IS Accessible</h2>\n",
            (false, _) => "<h2>Internet Accessibility was not tested</h2>\n",
            (true, _) => "<h2>Internet is NOT Accessible</h2>\n",
        });

        if summary.offer_restart {
            html.push_str(&format!(
                "<h2><a href=\"http://{0}/\" target=\"_blank\">Restart Captive Portal</a></h2>\n\
                 <h2><a href=\"http://{0}/giveup\" target=\"_blank\">Cancel Captive Portal</a></h2>\n",
                self.apip
            ));
        }

        html
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

const GREETING: &str = r#"<html><body>
<style>
input[type=submit] { font-size: 30px; }
input[type=checkbox] { height: 40px; width: 40px; }
body { font-size: 30px; }
form { font-size: 30px; }
</style>
<h1>Captive Portal for host {host}</h1>
<h2>To configure WiFi for host {host}:</h2>
<ul>
<li>If you don't want the Portal to provide a list of visible SSIDs to choose from, uncheck List Visible SSIDs below</li>
<li>Click the Submit button below</li>
<li>A new browser page with a form will open</li>
<li>Fill out the form and click Submit</li>
<li>Wait until the ACT LED flashes "...." or "---." or 30-60 seconds</li>
<li>Ensure your device is connected to the Captive Portal WiFi Network via the Settings App</li>
<li>Click Check WiFi Connection Status</li>
<li><b>IMPORTANT:</b> The system configuration is not complete until you have a successful Configuration Results response</li>
</ul>
<form action="/webform" target="_blank">
<div>
    <input type="checkbox" id="findssids" name="findssids" checked="checked">
    <label for="findssids">List visible SSIDs (takes a bit of time to collect)</label>
</div>
<br>
    <input type="submit" value="Submit">
</form>
<br><br>
<ul>
<li>If necessary, you can use the link below to check the connection status and complete the WiFi configuration</li>
<li>But first use the Settings App on your device to ensure you're connected to the Captive Portal WiFi Network again before clicking this link. <b>Turn WiFi Off/On, reconnect to the Captive Portal WiFi Network</b></li>
</ul>
<h3><a href="http://{apip}/checkresult" target="_blank">Check WiFi connection status</a></h3>
</body></html>
"#;

const WEB_FORM: &str = r#"<html><body>
<style>
input[type=submit] { font-size: 30px; }
input[type=text] { font-size: 40px; }
input[list] { font-size: 40px; }
input[type=checkbox] { height: 40px; width: 40px; }
h1 { font-size: 50px; }
body { font-size: 40px; }
form { font-size: 40px; }
table { font-size: 40px; }
</style>
<h1>Host {host} WiFi Configuration</h1>
<form action="/formsubmit">
<table>
<tr><td>SSID*</td><td><input type="text" list="foundssids" name="ssid">
<datalist id="foundssids">
{ssid_options}</datalist></td></tr>
<tr><td>Password*</td><td><input type="text" name="password" value=""></td></tr>
<tr><td><b>WiFi Country*</b></td><td><input type="text" name="wificountry" value=""></td></tr>
<tr><td>Keymap</td><td><input type="text" name="keymap" value=""></td></tr>
<tr><td>Locale</td><td><input type="text" name="locale" value=""></td></tr>
<tr><td>Timezone</td><td><input type="text" name="timezone" value=""></td></tr>
<tr><td>DHCPWait</td><td><input type="text" name="dhcpwait" value=""></td></tr>
</table><p>
<input type="submit" value="Submit">
<div>
    <input type="checkbox" id="validate" checked name="validate">
    <label for="validate">Validate WiFi Configuration by Connecting</label>
</div>
<div>
    <input type="checkbox" id="ckinternet" checked name="ckinternet">
    <label for="ckinternet">Check Internet Connectivity after WiFi Connected</label>
</div>
<div>
    <input type="checkbox" id="wifipower" checked name="wifipower">
    <label for="wifipower">Enable WiFi Power Management</label>
</div>
</form>
*  Entry is Required
</body></html>
"#;

const TEST_IN_PROGRESS: &str = r#"<html><body>
<style>
body { font-size: 30px; }
</style>
<h3>Testing host {host} WiFi Configuration...</h3>
<br>
<h3>Wait until the ACT LED flashes "...." or "---." or 30-60 seconds</h3>
<h3>Use the Settings app on your device to turn WiFi off/on...</h3>
<h3>...and then reconnect to the Captive Portal WiFi Network</h3>
<h3>Once connected, navigate to:</h3>
<h3><a href="http://{apip}/checkresult" target="_blank">Check WiFi connection status</a></h3>
</body></html>
"#;

const WAIT: &str = r#"<html><body>
<style>
body { font-size: 30px; }
</style>
<h3>Still testing host {host} WiFi Configuration...</h3>
<br>
<h3>Please continue waiting until the ACT LED flashes "...." or "---." or 30-60 seconds</h3>
<h3>Use the Settings app on your device to turn WiFi off/on...</h3>
<h3>...and then reconnect to the Captive Portal WiFi Network</h3>
<h3>Once connected, navigate to:</h3>
<h3><a href="http://{apip}/checkresult" target="_blank">Check WiFi connection status</a></h3>
</body></html>
"#;

const NOT_STARTED: &str = r#"<html><body>
<style>
body { font-size: 30px; }
</style>
<h3>Host {host} WiFi Configuration has not started</h3>
<br>
<h3>You MUST step through the Captive Portal in order</h3>
<h3>Please click this link to start the Captive Portal</h3>
<h3><a href="http://{apip}/" target="_blank">Start Captive Portal</a></h3>
</body></html>
"#;

const NOT_VALIDATED: &str = r#"<html><body>
<h1>WiFi Configuration for host {host} Complete</h1>
<h2>WiFi Connection was NOT Tested per request</h2>
</body></html>
"#;

const GIVE_UP: &str = r#"<html><body>
<h1>Stop host {host} WiFi configuration</h1>
<br>
<h2>The Captive Portal will now exit</h2>
<h2>Consult your system provider for assistance</h2>
</body></html>
"#;

const ERRORS: &str = r#"<html><body>
<style>
body { font-size: 30px; }
</style>
<h1>Errors Found for host {host}</h1>
<h2>{errors}</h2>
<h2><a href="http://{apip}/" target="_blank">Restart Captive Portal</a></h2>
<h2><a href="http://{apip}/giveup" target="_blank">Cancel Captive Portal</a></h2>
</body></html>
"#;

const RESULT: &str = r#"<html><body>
<style>
body { font-size: 30px; }
</style>
<h1>WiFi Configuration Results for host {host}</h1>
{result}</body></html>
"#;

const CLOSED: &str = r#"<html><body>
<h1>Captive Portal for host {host} has finished</h1>
<h2>Reconnect your device to your regular WiFi network</h2>
</body></html>
"#;
