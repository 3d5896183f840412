#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Dashboard,
    ServerList,
    DeviceInfo,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub view: View,
    pub title: &'static str,
    pub show_in_sidebar: bool,
}

pub const ROUTES: &[Route] = &[
    Route {
        path: "/",
        view: View::Dashboard,
        title: "Dashboard",
        show_in_sidebar: true,
    },
    Route {
        path: "/list",
        view: View::ServerList,
        title: "Server List",
        show_in_sidebar: true,
    },
    Route {
        path: "/servers",
        view: View::ServerList,
        title: "Servers",
        show_in_sidebar: true,
    },
    Route {
        path: "/servers/:serverId",
        view: View::DeviceInfo,
        title: "Server Details",
        show_in_sidebar: false,
    },
    Route {
        path: "/monitor",
        view: View::Monitor,
        title: "Monitor",
        show_in_sidebar: true,
    },
];

/// A route matched against a concrete path, with its `:param` captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub route: &'static Route,
    pub params: Vec<(&'static str, String)>,
}

impl Resolved {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

pub fn resolve(path: &str) -> Option<Resolved> {
    let segments: Vec<&str> = segments(path).collect();

    ROUTES.iter().find_map(|route| {
        let pattern: Vec<&'static str> = segments_static(route.path).collect();
        if pattern.len() != segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (expected, actual) in pattern.iter().zip(&segments) {
            match expected.strip_prefix(':') {
                Some(name) => params.push((name, (*actual).to_owned())),
                None if expected == actual => {}
                None => return None,
            }
        }
        Some(Resolved { route, params })
    })
}

/// Header title for `path`; unknown paths fall back to the dashboard.
pub fn title_for(path: &str) -> &'static str {
    resolve(path)
        .map(|resolved| resolved.route.title)
        .unwrap_or("Dashboard")
}

pub fn sidebar() -> impl Iterator<Item = &'static Route> {
    ROUTES.iter().filter(|route| route.show_in_sidebar)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn segments_static(path: &'static str) -> impl Iterator<Item = &'static str> {
    path.split('/').filter(|s| !s.is_empty())
}
