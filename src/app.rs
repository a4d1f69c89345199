use crate::cache::CachedList;
use crate::collapsable::{CollapsableId, CollapsableRegistry};
use crate::error::ApiError;
use crate::models::{Task, TaskPatch};
use crate::mutation::{MutationCoordinator, MutationFailure};
use crate::parser::parse_due_date;
use crate::routes::{share_url, Route};
use crate::tasks::{visible_tasks, SortOrder};
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ratatui::widgets::{ListState, TableState};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    EditDescription,
    EditDueDate,
    OpenList,
    Confirm(Confirm),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirm {
    DeleteAllTasks,
    DeleteList,
}

pub struct App {
    pub route: Route,
    pub share_base: String,
    coordinator: MutationCoordinator,
    failures: UnboundedReceiver<MutationFailure>,
    pub state: TableState,
    pub sort_order: SortOrder,
    pub sort_menu_state: ListState,
    pub hide_completed: bool,
    pub input_mode: InputMode,
    pub input: String,
    editing_task: Option<String>,
    pub status: Option<String>,
    pub collapsables: CollapsableRegistry,
    pub sort_menu: CollapsableId,
    pub help: CollapsableId,
    pending_create: Option<JoinHandle<Result<Task, ApiError>>>,
}

impl App {
    pub fn new(
        route: Route,
        share_base: &str,
        coordinator: MutationCoordinator,
        failures: UnboundedReceiver<MutationFailure>,
    ) -> App {
        let mut collapsables = CollapsableRegistry::new();
        let sort_menu = collapsables.subscribe();
        let help = collapsables.subscribe();
        let mut app = App {
            route: Route::Home,
            share_base: share_base.to_string(),
            coordinator,
            failures,
            state: TableState::default(),
            sort_order: SortOrder::default(),
            sort_menu_state: ListState::default(),
            hide_completed: false,
            input_mode: InputMode::Normal,
            input: String::new(),
            editing_task: None,
            status: None,
            collapsables,
            sort_menu,
            help,
            pending_create: None,
        };
        app.navigate(route);
        app
    }

    pub fn navigate(&mut self, route: Route) {
        if let Some(list_id) = route.list_id() {
            self.coordinator.cache().ensure(list_id);
        }
        if route.list_id() != self.route.list_id() {
            self.state.select(None);
            self.pending_create = None;
            // Each list view gets a fresh sort menu.
            self.collapsables.unsubscribe(self.sort_menu);
            self.sort_menu = self.collapsables.subscribe();
        }
        info!(path = %route.path(), "navigate");
        self.route = route;
        self.collapsables.close_all();
    }

    pub fn list_id(&self) -> Option<&str> {
        self.route.list_id()
    }

    pub fn share_link(&self) -> Option<String> {
        self.list_id()
            .map(|id| share_url(&self.share_base, &Route::List(id.to_string())))
    }

    pub fn cached(&self) -> CachedList {
        match self.list_id() {
            Some(id) => self.coordinator.cache().get(id),
            None => CachedList::Unloaded,
        }
    }

    /// All tasks of the current list, in server order.
    pub fn tasks(&self) -> Vec<Task> {
        self.cached().list().map(|l| l.tasks.clone()).unwrap_or_default()
    }

    pub fn visible(&self) -> Vec<Task> {
        visible_tasks(&self.tasks(), self.sort_order, self.hide_completed)
    }

    pub fn selected_task(&self) -> Option<Task> {
        let selected = self.state.selected()?;
        self.visible().into_iter().nth(selected)
    }

    pub fn pending_mutations(&self) -> usize {
        self.coordinator.pending()
    }

    pub fn is_refreshing(&self) -> bool {
        self.list_id()
            .is_some_and(|id| self.coordinator.cache().is_fetching(id))
    }

    pub fn next(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            self.state.select(None);
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i >= len - 1 {
                    0
                } else {
                    i + 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.visible().len();
        if len == 0 {
            self.state.select(None);
            return;
        }
        let i = match self.state.selected() {
            Some(i) => {
                if i == 0 {
                    len - 1
                } else {
                    i - 1
                }
            }
            None => 0,
        };
        self.state.select(Some(i));
    }

    /// Housekeeping between frames: surface failures, finish creates,
    /// keep the selection inside the visible rows.
    pub async fn tick(&mut self) {
        while let Ok(failure) = self.failures.try_recv() {
            warn!(kind = ?failure.kind, list_id = %failure.list_id, error = %failure.error, "change was rolled back");
            if failure.error.is_not_found() {
                self.status = Some("Already removed elsewhere, reloading".to_string());
            } else {
                self.status = Some(format!("Change not saved: {}", failure.error));
            }
        }

        if self.pending_create.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = self.pending_create.take() {
                match handle.await {
                    Ok(Ok(task)) => self.select_task_id(&task.id),
                    Ok(Err(_)) => {}
                    Err(err) => warn!(error = %err, "create task join failed"),
                }
            }
        }

        let len = self.visible().len();
        match self.state.selected() {
            Some(_) if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None if len > 0 && self.input_mode == InputMode::Normal => self.state.select(Some(0)),
            _ => {}
        }
    }

    fn select_task_id(&mut self, task_id: &str) {
        if let Some(idx) = self.visible().iter().position(|t| t.id == task_id) {
            self.state.select(Some(idx));
        }
    }

    pub fn toggle_completed(&mut self) {
        if let (Some(list_id), Some(task)) = (self.list_id(), self.selected_task()) {
            self.coordinator
                .edit_task(list_id, &task.id, TaskPatch::completed(!task.completed));
        }
    }

    pub fn cycle_priority(&mut self) {
        if let (Some(list_id), Some(task)) = (self.list_id(), self.selected_task()) {
            self.coordinator
                .edit_task(list_id, &task.id, TaskPatch::priority(task.priority.cycle()));
        }
    }

    pub fn delete_selected(&mut self) {
        if let (Some(list_id), Some(task)) = (self.list_id(), self.selected_task()) {
            self.coordinator.delete_task(list_id, &task.id);
        }
    }

    pub fn create_task(&mut self) {
        if let Some(list_id) = self.list_id() {
            self.pending_create = Some(self.coordinator.create_task(list_id));
        }
    }

    pub fn begin_edit_description(&mut self) {
        if let Some(task) = self.selected_task() {
            self.input = task.description.clone();
            self.editing_task = Some(task.id);
            self.input_mode = InputMode::EditDescription;
        }
    }

    /// Enter, Esc and clicking elsewhere all commit the edit.
    pub fn commit_description(&mut self) {
        let editing = self.editing_task.take();
        let description = std::mem::take(&mut self.input);
        if let (Some(list_id), Some(task_id)) = (self.list_id(), editing) {
            self.coordinator
                .edit_task(list_id, &task_id, TaskPatch::description(description));
        }
        self.input_mode = InputMode::Normal;
    }

    pub fn begin_edit_due_date(&mut self) {
        if let Some(task) = self.selected_task() {
            self.input = task.due_date.format("%Y-%m-%d").to_string();
            self.editing_task = Some(task.id);
            self.input_mode = InputMode::EditDueDate;
        }
    }

    pub fn commit_due_date(&mut self) {
        match parse_due_date(&self.input, Utc::now().date_naive()) {
            Ok(due) => {
                let editing = self.editing_task.take();
                if let (Some(list_id), Some(task_id)) = (self.list_id(), editing) {
                    self.coordinator
                        .edit_task(list_id, &task_id, TaskPatch::due_date(due));
                }
                self.cancel_input();
            }
            Err(err) => self.status = Some(err.to_string()),
        }
    }

    pub fn cancel_input(&mut self) {
        self.input.clear();
        self.editing_task = None;
        self.input_mode = InputMode::Normal;
    }

    pub fn toggle_hide_completed(&mut self) {
        self.hide_completed = !self.hide_completed;
        self.state.select(None);
    }

    pub fn set_sort_order(&mut self, order: SortOrder) {
        self.sort_order = order;
        self.collapsables.set_open(self.sort_menu, false);
    }

    pub fn toggle_sort_menu(&mut self) {
        self.collapsables.toggle(self.sort_menu);
        let current = SortOrder::ALL
            .iter()
            .position(|o| *o == self.sort_order)
            .unwrap_or(0);
        self.sort_menu_state.select(Some(current));
    }

    pub fn refresh(&mut self) {
        if let Some(list_id) = self.list_id() {
            self.coordinator.cache().invalidate(list_id);
        }
    }

    pub fn confirm(&mut self, action: Confirm) {
        match action {
            Confirm::DeleteAllTasks => {
                if let Some(list_id) = self.list_id() {
                    self.coordinator.delete_all_tasks(list_id);
                }
            }
            Confirm::DeleteList => {
                if let Some(list_id) = self.list_id().map(str::to_string) {
                    self.coordinator.delete_todolist(&list_id);
                    self.status = Some(format!("Deleted list {}", list_id));
                    self.navigate(Route::Home);
                }
            }
        }
        self.input_mode = InputMode::Normal;
    }

    pub async fn create_list(&mut self) {
        match self.coordinator.create_todolist().await {
            Ok(created) => {
                info!(list_id = %created.id, "created list");
                self.status = None;
                self.navigate(Route::List(created.id));
            }
            Err(err) => self.status = Some(format!("Could not create list: {}", err)),
        }
    }

    pub fn open_input(&mut self) {
        match Route::parse(&self.input) {
            Some(route) => {
                self.cancel_input();
                self.navigate(route);
            }
            None => self.status = Some(format!("Not a list id or link: {}", self.input.trim())),
        }
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        if let MouseEventKind::Down(MouseButton::Left) = event.kind {
            if self.input_mode == InputMode::EditDescription {
                self.commit_description();
            }
            self.collapsables.handle_click(event.column, event.row);
        }
    }

    pub async fn handle_input(&mut self, key: KeyEvent) -> std::io::Result<bool> {
        match self.input_mode {
            InputMode::Normal => return Ok(self.handle_normal(key).await),
            InputMode::EditDescription => match key.code {
                KeyCode::Enter | KeyCode::Esc | KeyCode::Tab => self.commit_description(),
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                _ => {}
            },
            InputMode::EditDueDate => match key.code {
                KeyCode::Enter => self.commit_due_date(),
                KeyCode::Esc => self.cancel_input(),
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                _ => {}
            },
            InputMode::OpenList => match key.code {
                KeyCode::Enter => self.open_input(),
                KeyCode::Esc => self.cancel_input(),
                KeyCode::Char(c) => self.input.push(c),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                _ => {}
            },
            InputMode::Confirm(action) => match key.code {
                KeyCode::Char('y') => self.confirm(action),
                _ => self.input_mode = InputMode::Normal,
            },
        }
        Ok(false)
    }

    async fn handle_normal(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('q') {
            return true;
        }
        if key.code == KeyCode::Char('?') {
            self.collapsables.toggle(self.help);
            return false;
        }
        if self.collapsables.is_open(self.sort_menu) {
            self.handle_sort_menu(key);
            return false;
        }
        if key.code == KeyCode::Esc && self.collapsables.any_open() {
            self.collapsables.close_all();
            return false;
        }

        match self.route.clone() {
            Route::Home => match key.code {
                KeyCode::Char('n') => self.create_list().await,
                KeyCode::Char('o') => {
                    self.input.clear();
                    self.input_mode = InputMode::OpenList;
                }
                _ => {}
            },
            Route::Charts(id) => match key.code {
                KeyCode::Esc | KeyCode::Char('c') | KeyCode::Char('l') => {
                    self.navigate(Route::List(id))
                }
                KeyCode::Char('r') => self.refresh(),
                KeyCode::Char('o') => self.navigate(Route::Home),
                _ => {}
            },
            Route::List(id) => match key.code {
                KeyCode::Char('j') | KeyCode::Down => self.next(),
                KeyCode::Char('k') | KeyCode::Up => self.previous(),
                KeyCode::Char(' ') => self.toggle_completed(),
                KeyCode::Char('p') => self.cycle_priority(),
                KeyCode::Char('e') | KeyCode::Enter => self.begin_edit_description(),
                KeyCode::Char('d') => self.begin_edit_due_date(),
                KeyCode::Char('x') => self.delete_selected(),
                KeyCode::Char('a') => self.create_task(),
                KeyCode::Char('h') => self.toggle_hide_completed(),
                KeyCode::Char('s') => self.toggle_sort_menu(),
                KeyCode::Char('r') => self.refresh(),
                KeyCode::Char('c') => self.navigate(Route::Charts(id)),
                KeyCode::Char('o') => self.navigate(Route::Home),
                KeyCode::Char('D') => self.input_mode = InputMode::Confirm(Confirm::DeleteAllTasks),
                KeyCode::Char('X') => self.input_mode = InputMode::Confirm(Confirm::DeleteList),
                _ => {}
            },
        }
        false
    }

    fn handle_sort_menu(&mut self, key: KeyEvent) {
        let len = SortOrder::ALL.len();
        let current = self.sort_menu_state.selected().unwrap_or(0);
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.sort_menu_state.select(Some((current + 1) % len))
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.sort_menu_state.select(Some((current + len - 1) % len))
            }
            KeyCode::Enter => self.set_sort_order(SortOrder::ALL[current]),
            KeyCode::Esc | KeyCode::Char('s') => self.collapsables.set_open(self.sort_menu, false),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LocalApi, TodoApi};
    use crate::cache::QueryCache;
    use crate::models::Priority;
    use crate::store::Store;
    use crossterm::event::KeyModifiers;
    use std::sync::Arc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    async fn app_with_tasks(count: usize) -> (App, Arc<LocalApi>, String) {
        let api = Arc::new(LocalApi::new(Arc::new(Store::open_in_memory().unwrap())));
        let list_id = api.create_todolist().await.unwrap().id;
        for _ in 0..count {
            api.create_task(&list_id).await.unwrap();
        }
        let cache = QueryCache::new(api.clone());
        cache.fetch(&list_id).await.unwrap();
        let (coordinator, failures) = MutationCoordinator::new(api.clone(), cache);
        let app = App::new(
            Route::List(list_id.clone()),
            "http://localhost:3000",
            coordinator,
            failures,
        );
        (app, api, list_id)
    }

    async fn settle(app: &mut App) {
        while app.pending_mutations() > 0 {
            tokio::task::yield_now().await;
        }
        app.tick().await;
    }

    #[tokio::test]
    async fn test_navigation_wraps() {
        let (mut app, _api, _id) = app_with_tasks(3).await;
        app.tick().await;
        assert_eq!(app.state.selected(), Some(0));
        app.previous();
        assert_eq!(app.state.selected(), Some(2));
        app.next();
        assert_eq!(app.state.selected(), Some(0));
    }

    #[tokio::test]
    async fn test_space_toggles_completed() {
        let (mut app, api, list_id) = app_with_tasks(1).await;
        app.tick().await;

        app.handle_input(key(KeyCode::Char(' '))).await.unwrap();
        assert!(app.tasks()[0].completed);
        settle(&mut app).await;

        let server = api.get_tasks(&list_id).await.unwrap().unwrap();
        assert!(server.tasks[0].completed);
    }

    #[tokio::test]
    async fn test_description_commits_on_enter() {
        let (mut app, api, list_id) = app_with_tasks(1).await;
        app.tick().await;

        app.handle_input(key(KeyCode::Char('e'))).await.unwrap();
        assert_eq!(app.input_mode, InputMode::EditDescription);
        for c in "buy milk".chars() {
            app.handle_input(key(KeyCode::Char(c))).await.unwrap();
        }
        app.handle_input(key(KeyCode::Enter)).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);
        settle(&mut app).await;

        let server = api.get_tasks(&list_id).await.unwrap().unwrap();
        assert_eq!(server.tasks[0].description, "buy milk");
    }

    #[tokio::test]
    async fn test_bad_due_date_keeps_editor_open() {
        let (mut app, _api, _id) = app_with_tasks(1).await;
        app.tick().await;

        app.handle_input(key(KeyCode::Char('d'))).await.unwrap();
        app.input = "someday".to_string();
        app.handle_input(key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.input_mode, InputMode::EditDueDate);
        assert!(app.status.is_some());
    }

    #[tokio::test]
    async fn test_created_task_gets_selected() {
        let (mut app, _api, _id) = app_with_tasks(2).await;
        app.tick().await;

        app.handle_input(key(KeyCode::Char('a'))).await.unwrap();
        while app.pending_create.as_ref().is_some_and(|h| !h.is_finished()) {
            tokio::task::yield_now().await;
        }
        settle(&mut app).await;

        assert_eq!(app.visible().len(), 3);
        assert_eq!(app.state.selected(), Some(2));
    }

    #[tokio::test]
    async fn test_sort_menu_selects_order() {
        let (mut app, _api, _id) = app_with_tasks(0).await;

        app.handle_input(key(KeyCode::Char('s'))).await.unwrap();
        assert!(app.collapsables.is_open(app.sort_menu));
        app.handle_input(key(KeyCode::Char('j'))).await.unwrap();
        app.handle_input(key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.sort_order, SortOrder::Priority);
        assert!(!app.collapsables.is_open(app.sort_menu));
    }

    #[tokio::test]
    async fn test_hide_completed_and_priority_sort() {
        let (mut app, api, list_id) = app_with_tasks(3).await;
        let tasks = app.tasks();
        api.edit_task(&tasks[0].id, TaskPatch::priority(Priority::High))
            .await
            .unwrap();
        api.edit_task(&tasks[1].id, TaskPatch::completed(true))
            .await
            .unwrap();
        app.coordinator.cache().fetch(&list_id).await.unwrap();

        app.hide_completed = true;
        app.sort_order = SortOrder::Priority;
        let visible: Vec<String> = app.visible().into_iter().map(|t| t.id).collect();
        assert_eq!(visible, vec![tasks[2].id.clone(), tasks[0].id.clone()]);
    }

    #[tokio::test]
    async fn test_delete_list_goes_home() {
        let (mut app, api, list_id) = app_with_tasks(1).await;

        app.handle_input(key(KeyCode::Char('X'))).await.unwrap();
        assert_eq!(app.input_mode, InputMode::Confirm(Confirm::DeleteList));
        app.handle_input(key(KeyCode::Char('y'))).await.unwrap();
        assert_eq!(app.route, Route::Home);
        settle(&mut app).await;

        assert!(api.get_tasks(&list_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_list_by_link() {
        let (mut app, _api, list_id) = app_with_tasks(0).await;
        app.navigate(Route::Home);

        app.handle_input(key(KeyCode::Char('o'))).await.unwrap();
        app.input = format!("http://localhost:3000/{}/charts", list_id);
        app.handle_input(key(KeyCode::Enter)).await.unwrap();

        assert_eq!(app.route, Route::Charts(list_id.clone()));
        assert_eq!(
            app.share_link(),
            Some(format!("http://localhost:3000/{}", list_id))
        );
    }
}
