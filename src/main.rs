use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::application::ApplicationHandler;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use casement::clip::Rect;
use casement::content::Assets;
use casement::gpu::{FrameStatus, GpuRenderer};
use casement::input::{GuiEvent, Key, MouseButton, PointerEvent};
use casement::manager::GuiManager;
use casement::menu;
use casement::skin::SkinSet;
use casement::theme::Theme;
use casement::tree::NodeId;
use casement::widgets::{
    CheckBoxWidget, LabelWidget, MenuBarWidget, MenuButtonWidget, PanelWidget, PopUpWidget,
    WidgetKind,
};

/// Convert sRGB component (0-1) to linear for use as wgpu clear color.
fn srgb_to_linear(s: f32) -> f32 {
    if s <= 0.04045 {
        s / 12.92
    } else {
        ((s + 0.055) / 1.055).powf(2.4)
    }
}

const BG_SRGB: [f32; 3] = [40.0 / 255.0, 40.0 / 255.0, 40.0 / 255.0]; // #282828

const CURSOR_BLINK: Duration = Duration::from_millis(500);

struct App {
    renderer: Option<GpuRenderer>,
    assets: Option<Assets>,
    gui: GuiManager,
    status_label: Option<NodeId>,
    last_blink: Instant,
}

impl App {
    /// Menu bar with File/Edit menus, a nested Export submenu, and a
    /// status panel showing the last chosen item.
    fn build_scene(&mut self) {
        let Some(assets) = self.assets else {
            return;
        };
        let theme = self.gui.theme.clone();

        let bar = self.gui.add(WidgetKind::MenuBar(MenuBarWidget {
            skin: skin_or_flat(theme.menu_bar_skin),
        }));
        let _ = self.gui.tree.set_bounds(bar, Rect::new(0, 0, 800, theme.menu_bar_height));

        let file = self.add_bar_button(bar, "File");
        let edit = self.add_bar_button(bar, "Edit");
        self.gui.layout_menu_bar(&assets, bar);

        let file_popup = self.new_popup(&theme);
        menu::set_popup(&mut self.gui.tree, file, file_popup).expect("link file menu");
        self.add_item(file_popup, "New");
        self.add_item(file_popup, "Open...");
        let _ = self.gui.tree.insert(file_popup, WidgetKind::Separator);
        let export = self.add_item(file_popup, "Export");
        let _ = self.gui.tree.insert(file_popup, WidgetKind::Separator);
        self.add_item(file_popup, "Exit");

        let export_popup = self.new_popup(&theme);
        menu::set_popup(&mut self.gui.tree, export, export_popup).expect("link export menu");
        self.add_item(export_popup, "As PNG");
        self.add_item(export_popup, "As SVG");

        let edit_popup = self.new_popup(&theme);
        menu::set_popup(&mut self.gui.tree, edit, edit_popup).expect("link edit menu");
        self.add_item(edit_popup, "Undo");
        let redo = self.add_item(edit_popup, "Redo");
        if let Some(node) = self.gui.tree.get_mut(redo)
            && let WidgetKind::MenuButton(b) = &mut node.widget
        {
            b.enabled = false;
        }

        let panel = self.gui.add(WidgetKind::Panel(PanelWidget {
            skin: skin_or_flat(theme.panel_skin),
        }));
        let _ = self.gui.tree.set_bounds(panel, Rect::new(20, 60, 300, 60));
        let label = self
            .gui
            .tree
            .insert(
                panel,
                WidgetKind::Label(LabelWidget::new("Hello", theme.text_color)),
            )
            .expect("insert label");
        let _ = self.gui.tree.set_bounds(label, Rect::new(10, 8, 280, 20));
        self.status_label = Some(label);

        let check = self
            .gui
            .tree
            .insert(
                panel,
                WidgetKind::CheckBox(CheckBoxWidget::new(
                    "Autosave",
                    SkinSet::toggle(theme.check_box_skin, theme.check_box_checked_skin)
                        .unwrap_or_default(),
                )),
            )
            .expect("insert check box");
        let _ = self.gui.tree.set_bounds(check, Rect::new(10, 32, 180, 20));
    }

    fn add_bar_button(&mut self, bar: NodeId, text: &str) -> NodeId {
        let mut button = MenuButtonWidget::new(text);
        button.highlight = skin_or_flat(self.gui.theme.highlight_skin);
        self.gui
            .tree
            .insert(bar, WidgetKind::MenuButton(button))
            .expect("insert bar button")
    }

    fn new_popup(&mut self, theme: &Theme) -> NodeId {
        self.gui
            .tree
            .new_node(WidgetKind::PopUpMenu(PopUpWidget::new(skin_or_flat(
                theme.popup_skin,
            ))))
    }

    fn add_item(&mut self, popup: NodeId, text: &str) -> NodeId {
        let mut button = MenuButtonWidget::new(text);
        button.highlight = skin_or_flat(self.gui.theme.highlight_skin);
        self.gui
            .tree
            .insert(popup, WidgetKind::MenuButton(button))
            .expect("insert menu item")
    }

    fn handle_gui_events(&mut self) {
        while let Some(event) = self.gui.poll_event() {
            match event {
                GuiEvent::MenuItemChosen(item) => {
                    let text = match self.gui.tree.get(item).map(|n| &n.widget) {
                        Some(WidgetKind::MenuButton(b)) => b.text.clone(),
                        _ => continue,
                    };
                    log::info!("menu item chosen: {text}");
                    if let Some(label) = self.status_label
                        && let Some(node) = self.gui.tree.get_mut(label)
                        && let WidgetKind::Label(l) = &mut node.widget
                    {
                        l.text = text;
                    }
                    if let Some(label) = self.status_label {
                        self.gui.tree.mark_redraw(label);
                    }
                }
                GuiEvent::Toggled(_, on) => {
                    log::info!("autosave {}", if on { "on" } else { "off" });
                }
                _ => {}
            }
        }
    }
}

fn skin_or_flat(region: Rect) -> SkinSet {
    SkinSet::single(region).unwrap_or_default()
}

fn map_button(button: winit::event::MouseButton) -> Option<MouseButton> {
    match button {
        winit::event::MouseButton::Left => Some(MouseButton::Left),
        winit::event::MouseButton::Right => Some(MouseButton::Right),
        winit::event::MouseButton::Middle => Some(MouseButton::Middle),
        _ => None,
    }
}

fn map_key(key: &winit::keyboard::Key) -> Option<Key> {
    use winit::keyboard::NamedKey;
    match key {
        winit::keyboard::Key::Named(named) => match named {
            NamedKey::Enter => Some(Key::Enter),
            NamedKey::Escape => Some(Key::Escape),
            NamedKey::Tab => Some(Key::Tab),
            NamedKey::Backspace => Some(Key::Backspace),
            NamedKey::Delete => Some(Key::Delete),
            NamedKey::ArrowLeft => Some(Key::Left),
            NamedKey::ArrowRight => Some(Key::Right),
            NamedKey::ArrowUp => Some(Key::Up),
            NamedKey::ArrowDown => Some(Key::Down),
            NamedKey::Home => Some(Key::Home),
            NamedKey::End => Some(Key::End),
            NamedKey::Space => Some(Key::Char(' ')),
            _ => None,
        },
        winit::keyboard::Key::Character(s) => s.chars().next().map(Key::Char),
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("Casement")
            .with_inner_size(winit::dpi::LogicalSize::new(800.0, 600.0));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));

        let mut renderer = GpuRenderer::new(window);
        let assets = Assets::load(&mut renderer, "data/skin.png", "data/font.png");

        self.renderer = Some(renderer);
        self.assets = Some(assets);
        self.build_scene();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let pointer = match event {
            WindowEvent::CloseRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    self.gui.clean_up(renderer);
                }
                event_loop.exit();
                return;
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size);
                }
                return;
            }
            WindowEvent::CursorMoved { position, .. } => Some(PointerEvent::Moved {
                x: position.x as i32,
                y: position.y as i32,
            }),
            WindowEvent::MouseInput { state, button, .. } => {
                map_button(button).map(|button| {
                    let (x, y) = {
                        let input = &self.gui.input;
                        (input.cursor.0, input.cursor.1)
                    };
                    match state {
                        ElementState::Pressed => PointerEvent::ButtonDown { button, x, y },
                        ElementState::Released => PointerEvent::ButtonUp { button, x, y },
                    }
                })
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed
                    && let Some(key) = map_key(&event.logical_key)
                    && let Some(assets) = self.assets
                {
                    self.gui.handle_key(&assets, key);
                    self.handle_gui_events();
                }
                return;
            }
            WindowEvent::RedrawRequested => {
                if let (Some(renderer), Some(assets)) = (self.renderer.as_mut(), &self.assets) {
                    let (w, h) = renderer.screen_size();
                    match renderer.begin_frame() {
                        FrameStatus::Ready => {
                            let clear = [
                                srgb_to_linear(BG_SRGB[0]),
                                srgb_to_linear(BG_SRGB[1]),
                                srgb_to_linear(BG_SRGB[2]),
                                1.0,
                            ];
                            self.gui.draw(
                                renderer,
                                assets,
                                Rect::new(0, 0, w as i32, h as i32),
                                Some(clear),
                            );
                            renderer.end_frame();
                        }
                        FrameStatus::DeviceLost => self.gui.device_reset(renderer),
                        FrameStatus::Skipped => {}
                    }
                }
                return;
            }
            _ => None,
        };

        if let (Some(event), Some(assets)) = (pointer, &self.assets) {
            self.gui.handle_pointer(assets, event);
            self.handle_gui_events();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        // Blink the status label cursor.
        if self.last_blink.elapsed() >= CURSOR_BLINK {
            self.last_blink = Instant::now();
            if let Some(label) = self.status_label {
                if let Some(node) = self.gui.tree.get_mut(label)
                    && let WidgetKind::Label(l) = &mut node.widget
                {
                    l.show_cursor = !l.show_cursor;
                }
                self.gui.tree.mark_redraw(label);
            }
        }
        if let Some(renderer) = self.renderer.as_ref() {
            renderer.window().request_redraw();
        }
    }
}

fn main() {
    env_logger::init();

    let theme = Theme::load("data/theme.ron");

    let event_loop = EventLoop::new().expect("create event loop");
    let mut app = App {
        renderer: None,
        assets: None,
        gui: GuiManager::new(theme),
        status_label: None,
        last_blink: Instant::now(),
    };
    event_loop.run_app(&mut app).expect("run event loop");
}
