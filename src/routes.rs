use reqwest::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    List(String),
    Charts(String),
}

impl Route {
    /// Accepts a bare id, a path like `/<id>/charts`, or a full share URL.
    pub fn parse(input: &str) -> Option<Route> {
        let input = input.trim();
        let path = match Url::parse(input) {
            Ok(url) if url.has_host() => url.path().to_string(),
            _ => input.to_string(),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Some(Route::Home),
            [id] => Some(Route::List(id.to_string())),
            [id, "charts"] => Some(Route::Charts(id.to_string())),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::List(id) => format!("/{}", id),
            Route::Charts(id) => format!("/{}/charts", id),
        }
    }

    pub fn list_id(&self) -> Option<&str> {
        match self {
            Route::Home => None,
            Route::List(id) | Route::Charts(id) => Some(id),
        }
    }
}

pub fn share_url(base: &str, route: &Route) -> String {
    format!("{}{}", base.trim_end_matches('/'), route.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paths() {
        assert_eq!(Route::parse("/"), Some(Route::Home));
        assert_eq!(Route::parse(""), Some(Route::Home));
        assert_eq!(Route::parse("abc"), Some(Route::List("abc".to_string())));
        assert_eq!(Route::parse("/abc"), Some(Route::List("abc".to_string())));
        assert_eq!(
            Route::parse("/abc/charts"),
            Some(Route::Charts("abc".to_string()))
        );
        assert_eq!(Route::parse("/abc/other"), None);
    }

    #[test]
    fn test_parse_share_url() {
        assert_eq!(
            Route::parse("http://todo.example.com:3000/abc/charts"),
            Some(Route::Charts("abc".to_string()))
        );
    }

    #[test]
    fn test_share_url() {
        let route = Route::List("abc".to_string());
        assert_eq!(share_url("http://localhost:3000/", &route), "http://localhost:3000/abc");
        assert_eq!(Route::parse(&share_url("http://localhost:3000", &route)), Some(route));
    }
}
