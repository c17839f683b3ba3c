//! Leptos views for the room administration pages, rendered to strings on
//! the server. Text and attribute values are escaped by the renderer.

use std::collections::BTreeMap;

use leptos::*;

use crate::model::Room;

/// Raw form values, echoed back when a submission is rejected.
#[derive(Debug, Clone, Default)]
pub struct RoomFields {
    pub name: String,
    pub capacity: String,
    pub location: String,
}

impl From<&Room> for RoomFields {
    fn from(r: &Room) -> Self {
        Self {
            name: r.name.clone(),
            capacity: r.capacity.to_string(),
            location: r.location.clone().unwrap_or_default(),
        }
    }
}

fn document<F, N>(page: F) -> String
where
    F: FnOnce() -> N + 'static,
    N: IntoView,
{
    format!("<!DOCTYPE html>\n{}", leptos::ssr::render_to_string(page))
}

#[component]
fn Shell(#[prop(into)] title: String, children: Children) -> impl IntoView {
    let head_title = format!("{title} | examd");
    view! {
        <html lang="fr">
            <head>
                <meta charset="utf-8"/>
                <title>{head_title}</title>
            </head>
            <body>
                <nav><a href="/salles">"Salles"</a></nav>
                <h1>{title}</h1>
                {children()}
            </body>
        </html>
    }
}

#[component]
fn RoomRow(room: Room, csrf: String) -> impl IntoView {
    let edit = format!("/salles/{}/edit", room.id);
    let action = format!("/salles/{}", room.id);
    let location = room.location.unwrap_or_default();
    view! {
        <tr>
            <td>{room.name}</td>
            <td>{room.capacity}</td>
            <td>{location}</td>
            <td>
                <a href=edit>"Modifier"</a>
                <form method="post" action=action>
                    <input type="hidden" name="_token" value=csrf/>
                    <input type="hidden" name="_method" value="DELETE"/>
                    <button type="submit">"Supprimer"</button>
                </form>
            </td>
        </tr>
    }
}

#[component]
fn Field(
    name: &'static str,
    label: &'static str,
    value: String,
    error: Option<String>,
) -> impl IntoView {
    view! {
        <p>
            <label for=name>{label}</label>
            " "
            <input id=name name=name value=value/>
            " "
            {error.map(|e| view! { <span class="error">{e}</span> })}
        </p>
    }
}

pub fn room_index(rooms: Vec<Room>, csrf: String) -> String {
    document(move || {
        let empty = rooms.is_empty();
        let rows = rooms
            .into_iter()
            .map(|room| view! { <RoomRow room=room csrf=csrf.clone()/> })
            .collect_view();
        view! {
            <Shell title="Salles">
                <p><a href="/salles/create">"Nouvelle salle"</a></p>
                <table>
                    <thead>
                        <tr><th>"Nom"</th><th>"Capacité"</th><th>"Emplacement"</th><th></th></tr>
                    </thead>
                    <tbody>
                        {rows}
                        {empty.then(|| view! { <tr><td colspan="4">"Aucune salle."</td></tr> })}
                    </tbody>
                </table>
            </Shell>
        }
    })
}

/// Create form when `method` is `None`, edit form (with a `_method`
/// override) otherwise.
pub fn room_form(
    action: String,
    method: Option<&'static str>,
    fields: RoomFields,
    errors: BTreeMap<String, String>,
    csrf: String,
) -> String {
    let title = if method.is_some() {
        "Modifier la salle"
    } else {
        "Nouvelle salle"
    };
    document(move || {
        let inputs = [
            ("name", "Nom", fields.name),
            ("capacity", "Capacité", fields.capacity),
            ("location", "Emplacement", fields.location),
        ]
        .into_iter()
        .map(|(name, label, value)| {
            let error = errors.get(name).cloned();
            view! { <Field name=name label=label value=value error=error/> }
        })
        .collect_view();
        view! {
            <Shell title=title>
                <form method="post" action=action>
                    <input type="hidden" name="_token" value=csrf/>
                    {method.map(|m| view! { <input type="hidden" name="_method" value=m/> })}
                    {inputs}
                    <button type="submit">"Enregistrer"</button>
                </form>
            </Shell>
        }
    })
}

pub fn message(title: String, text: String) -> String {
    document(move || {
        view! {
            <Shell title=title>
                <p>{text}</p>
            </Shell>
        }
    })
}
