//! GTK4 pressure control window
//!
//! Two valve toggle buttons and two pressure fields with set buttons.
//! Toggle labels follow the channel bank, so valves opened by a running
//! print show up without a click. Closing the window runs the surface's
//! close hook.

use crate::surface::ControlSurface;
use dispensekit_core::Channel;
use gtk4::prelude::*;
use gtk4::{glib, Application, ApplicationWindow, Box, Button, Entry, Label, Orientation};
use std::time::Duration;

const APP_ID: &str = "io.github.dispensekit.PressureControl";
const LABEL_REFRESH: Duration = Duration::from_millis(200);

/// Run the window on the calling thread until it is closed
pub fn run_window(surface: ControlSurface) -> glib::ExitCode {
    let app = Application::builder().application_id(APP_ID).build();
    app.connect_activate(move |app| build_window(app, surface.clone()));
    app.run_with_args::<&str>(&[])
}

fn build_window(app: &Application, surface: ControlSurface) {
    let window = ApplicationWindow::builder()
        .application(app)
        .title("Pressure Control System")
        .default_width(400)
        .default_height(300)
        .build();

    let main_box = Box::new(Orientation::Vertical, 10);
    main_box.set_margin_top(10);
    main_box.set_margin_bottom(10);
    main_box.set_margin_start(10);
    main_box.set_margin_end(10);

    let mut toggles = Vec::new();
    for channel in Channel::ALL {
        let toggle = Button::with_label(&surface.valve_label(channel));
        let surface_toggle = surface.clone();
        toggle.connect_clicked(move |btn| match surface_toggle.toggle_valve(channel) {
            Ok(result) => btn.set_label(&result.label),
            Err(e) => tracing::error!("Valve {} toggle failed: {}", channel, e),
        });
        main_box.append(&toggle);
        toggles.push((channel, toggle.downgrade()));
    }

    let surface_labels = surface.clone();
    glib::timeout_add_local(LABEL_REFRESH, move || {
        for (channel, toggle) in &toggles {
            let Some(toggle) = toggle.upgrade() else {
                return glib::ControlFlow::Break;
            };
            let label = surface_labels.valve_label(*channel);
            if toggle.label().as_deref() != Some(label.as_str()) {
                toggle.set_label(&label);
            }
        }
        glib::ControlFlow::Continue
    });

    for channel in Channel::ALL {
        let label = Label::new(Some(&format!("Pressure {} (psi):", channel)));
        let entry = Entry::new();
        entry.set_text(&surface.desired(channel).to_string());
        let set_btn = Button::with_label(&format!("Set Pressure {}", channel));

        let surface_set = surface.clone();
        let entry_clone = entry.clone();
        set_btn.connect_clicked(move |_| {
            if let Err(e) = surface_set.submit_pressure(channel, &entry_clone.text()) {
                tracing::warn!("{}", e);
            }
        });

        main_box.append(&label);
        main_box.append(&entry);
        main_box.append(&set_btn);
    }

    window.connect_close_request(move |_| {
        if let Err(e) = surface.close() {
            tracing::warn!("Cleanup on close failed: {}", e);
        }
        glib::Propagation::Proceed
    });

    window.set_child(Some(&main_box));
    window.present();
}
